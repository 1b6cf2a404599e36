// Copyright 2025 monofn Authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use anyhow::Result;
use chrono::Utc;
use crossterm::{
    event::{self, DisableMouseCapture, EnableMouseCapture, KeyCode, KeyEvent},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use monofn_common::{InvocationResult, InvocationStatus};
use monofn_dashboard::DashboardSnapshot;
use ratatui::{
    backend::CrosstermBackend,
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph, Row, Table, Wrap},
    Frame, Terminal,
};
use std::io;
use std::time::{Duration, Instant};

/// Format duration in milliseconds to human-readable string
fn format_duration_ms(ms: u64) -> String {
    if ms < 1000 {
        format!("{}ms", ms)
    } else if ms < 60_000 {
        format!("{}s", ms / 1000)
    } else if ms < 3_600_000 {
        format!("{}m {}s", ms / 60_000, (ms % 60_000) / 1000)
    } else {
        format!("{}h {}m", ms / 3_600_000, (ms % 3_600_000) / 60_000)
    }
}

fn status_color(status: InvocationStatus) -> Color {
    match status {
        InvocationStatus::Ok => Color::Green,
        InvocationStatus::Error => Color::Red,
        InvocationStatus::Timeout => Color::Magenta,
    }
}

/// Output for ok results, `kind: message` otherwise.
fn result_detail(result: &InvocationResult) -> String {
    match result.output() {
        Some(output) => output.to_string(),
        None => format!(
            "{}: {}",
            result.error_kind().unwrap_or_default(),
            result.error_message().unwrap_or_default()
        ),
    }
}

/// Guard to restore terminal state on drop (even during panic)
struct TerminalGuard {
    terminal: Terminal<CrosstermBackend<io::Stdout>>,
}

impl Drop for TerminalGuard {
    fn drop(&mut self) {
        let _ = disable_raw_mode();
        let _ = execute!(
            self.terminal.backend_mut(),
            LeaveAlternateScreen,
            DisableMouseCapture
        );
        let _ = self.terminal.show_cursor();
    }
}

/// TUI application state
struct TopApp {
    dashboard_url: String,
    http: reqwest::Client,
    /// Last snapshot fetched successfully; kept while the dashboard is unreachable
    snapshot: Option<DashboardSnapshot>,
    error_message: Option<String>,
    last_update: Option<Instant>,
    interval_ms: u64,
    should_quit: bool,
}

impl TopApp {
    fn new(dashboard_url: String, interval_ms: u64) -> Self {
        Self {
            dashboard_url,
            http: reqwest::Client::new(),
            snapshot: None,
            error_message: None,
            last_update: None,
            interval_ms,
            should_quit: false,
        }
    }

    fn snapshot_url(&self) -> String {
        format!("{}/api/snapshot", self.dashboard_url.trim_end_matches('/'))
    }

    async fn fetch(&self) -> Result<DashboardSnapshot> {
        let snapshot = self
            .http
            .get(self.snapshot_url())
            .send()
            .await?
            .error_for_status()?
            .json::<DashboardSnapshot>()
            .await?;
        Ok(snapshot)
    }

    async fn update_snapshot(&mut self) {
        match self.fetch().await {
            Ok(snapshot) => {
                self.snapshot = Some(snapshot);
                self.last_update = Some(Instant::now());
                self.error_message = None;
            }
            Err(e) => {
                self.error_message = Some(format!("Failed to fetch snapshot: {}", e));
            }
        }
    }

    fn handle_key_event(&mut self, key: KeyEvent) {
        if let KeyCode::Char('q') | KeyCode::Char('Q') = key.code {
            self.should_quit = true;
        }
    }

    fn draw(&self, f: &mut Frame<'_>) {
        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .margin(1)
            .constraints([
                Constraint::Length(3), // Title bar
                Constraint::Length(6), // Summary
                Constraint::Min(0),    // Recent invocations
            ])
            .split(f.area());

        self.draw_title_bar(f, chunks[0]);

        match (&self.snapshot, &self.error_message) {
            (Some(snapshot), _) => self.draw_summary(f, chunks[1], snapshot),
            (None, Some(error)) => self.draw_error(f, chunks[1], error),
            (None, None) => self.draw_loading(f, chunks[1]),
        }

        if let Some(snapshot) = &self.snapshot {
            self.draw_recent_table(f, chunks[2], snapshot);
        }
    }

    fn draw_title_bar(&self, f: &mut Frame<'_>, area: Rect) {
        let key = self
            .snapshot
            .as_ref()
            .map(|s| s.key.clone())
            .unwrap_or_else(|| "?".to_string());

        let title = Line::from(vec![
            Span::styled(
                "monofn ",
                Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
            ),
            Span::styled(key, Style::default().fg(Color::Green).add_modifier(Modifier::BOLD)),
            Span::raw(" | "),
            Span::styled(self.dashboard_url.clone(), Style::default().fg(Color::Yellow)),
            Span::raw(" | "),
            Span::styled(
                format!("Refresh: {}ms", self.interval_ms),
                Style::default().fg(Color::Blue),
            ),
            Span::raw(" | "),
            Span::styled(
                "Press 'q' to quit",
                Style::default().fg(Color::Red).add_modifier(Modifier::BOLD),
            ),
        ]);

        let paragraph = Paragraph::new(title)
            .block(
                Block::default()
                    .borders(Borders::ALL)
                    .border_style(Style::default().fg(Color::Cyan)),
            )
            .alignment(Alignment::Center);

        f.render_widget(paragraph, area);
    }

    fn draw_summary(&self, f: &mut Frame<'_>, area: Rect, snapshot: &DashboardSnapshot) {
        let summary = &snapshot.summary;
        let bold = |color: Color| Style::default().fg(color).add_modifier(Modifier::BOLD);

        let last_success = snapshot
            .poll
            .last_success_at
            .map(|t| {
                let ago = (Utc::now() - t).num_milliseconds().max(0) as u64;
                format!("{} ago", format_duration_ms(ago))
            })
            .unwrap_or_else(|| "never".to_string());

        let mut text = vec![
            Line::from(vec![
                Span::styled("Total: ", Style::default().fg(Color::Cyan)),
                Span::styled(summary.total.to_string(), bold(Color::White)),
                Span::raw("  "),
                Span::styled("OK: ", Style::default().fg(Color::Green)),
                Span::styled(summary.ok.to_string(), bold(Color::Green)),
                Span::raw("  "),
                Span::styled("Errors: ", Style::default().fg(Color::Red)),
                Span::styled(summary.error.to_string(), bold(Color::Red)),
                Span::raw("  "),
                Span::styled("Timeouts: ", Style::default().fg(Color::Magenta)),
                Span::styled(summary.timeout.to_string(), bold(Color::Magenta)),
                Span::raw("  "),
                Span::styled("Error Rate: ", Style::default().fg(Color::Cyan)),
                Span::styled(format!("{:.1}%", summary.error_rate * 100.0), bold(Color::Yellow)),
            ]),
            Line::from(vec![
                Span::styled("Mean Duration: ", Style::default().fg(Color::Cyan)),
                Span::styled(format!("{:.1}ms", summary.mean_duration_ms), bold(Color::White)),
                Span::raw("  "),
                Span::styled("Polls: ", Style::default().fg(Color::Cyan)),
                Span::styled(snapshot.poll.polls.to_string(), bold(Color::White)),
                Span::raw("  "),
                Span::styled("Last Success: ", Style::default().fg(Color::Cyan)),
                Span::styled(last_success, bold(Color::White)),
            ]),
        ];

        if let Some(error) = &snapshot.poll.last_error {
            text.push(Line::from(vec![
                Span::styled("Store: ", Style::default().fg(Color::Red).add_modifier(Modifier::BOLD)),
                Span::styled(error.clone(), Style::default().fg(Color::Red)),
            ]));
        }
        if let Some(error) = &self.error_message {
            text.push(Line::from(vec![
                Span::styled("Dashboard: ", Style::default().fg(Color::Red).add_modifier(Modifier::BOLD)),
                Span::styled(error.clone(), Style::default().fg(Color::Red)),
            ]));
        }

        let paragraph = Paragraph::new(text)
            .block(
                Block::default()
                    .title(" Summary ")
                    .title_style(Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD))
                    .borders(Borders::ALL)
                    .border_style(Style::default().fg(Color::Cyan)),
            )
            .wrap(Wrap { trim: true })
            .alignment(Alignment::Center);

        f.render_widget(paragraph, area);
    }

    fn draw_error(&self, f: &mut Frame<'_>, area: Rect, error: &str) {
        let text = vec![
            Line::from(vec![
                Span::styled("ERROR: ", Style::default().fg(Color::Red).add_modifier(Modifier::BOLD)),
                Span::styled(error, Style::default().fg(Color::Red)),
            ]),
            Line::from(vec![Span::styled(
                "Will keep trying to connect...",
                Style::default().fg(Color::Yellow),
            )]),
        ];

        let paragraph = Paragraph::new(text)
            .block(
                Block::default()
                    .title(" Status ")
                    .title_style(Style::default().fg(Color::Red).add_modifier(Modifier::BOLD))
                    .borders(Borders::ALL)
                    .border_style(Style::default().fg(Color::Red)),
            )
            .wrap(Wrap { trim: true })
            .alignment(Alignment::Center);

        f.render_widget(paragraph, area);
    }

    fn draw_loading(&self, f: &mut Frame<'_>, area: Rect) {
        let paragraph = Paragraph::new(Line::from(Span::styled(
            "Connecting to dashboard...",
            Style::default().fg(Color::Yellow),
        )))
        .block(
            Block::default()
                .title(" Status ")
                .title_style(Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD))
                .borders(Borders::ALL)
                .border_style(Style::default().fg(Color::Yellow)),
        )
        .alignment(Alignment::Center);

        f.render_widget(paragraph, area);
    }

    /// Most recent invocations, newest first.
    fn draw_recent_table(&self, f: &mut Frame<'_>, area: Rect, snapshot: &DashboardSnapshot) {
        let widths = [
            Constraint::Percentage(30),
            Constraint::Percentage(10),
            Constraint::Percentage(15),
            Constraint::Percentage(10),
            Constraint::Percentage(35),
        ];

        let rows: Vec<Row> = snapshot
            .recent
            .iter()
            .rev()
            .map(|result| {
                Row::new(vec![
                    result.request_id.clone(),
                    result.status().to_string(),
                    result.started_at.format("%H:%M:%S").to_string(),
                    format_duration_ms(result.duration_ms),
                    result_detail(result),
                ])
                .style(Style::default().fg(status_color(result.status())))
            })
            .collect();

        let table = Table::new(rows, widths)
            .block(
                Block::default()
                    .title(" Recent Invocations ")
                    .title_style(Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD))
                    .borders(Borders::ALL)
                    .border_style(Style::default().fg(Color::Cyan)),
            )
            .header(
                Row::new(vec!["Request", "Status", "Started", "Duration", "Output / Error"])
                    .style(Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD)),
            );

        f.render_widget(table, area);
    }
}

/// Run the top TUI against a dashboard.
pub async fn run_top(dashboard_url: String, interval_ms: u64) -> Result<()> {
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let terminal = Terminal::new(CrosstermBackend::new(stdout))?;

    // Restores the terminal when dropped, including on early return
    let mut guard = TerminalGuard { terminal };

    let mut app = TopApp::new(dashboard_url, interval_ms);
    let tick_rate = Duration::from_millis(interval_ms.max(1));
    let mut last_tick: Option<Instant> = None;

    while !app.should_quit {
        if last_tick.map_or(true, |t| t.elapsed() >= tick_rate) {
            app.update_snapshot().await;
            last_tick = Some(Instant::now());
        }

        guard.terminal.draw(|f| app.draw(f))?;

        let elapsed = last_tick.map(|t| t.elapsed()).unwrap_or_default();
        if event::poll(tick_rate.saturating_sub(elapsed))? {
            if let event::Event::Key(key) = event::read()? {
                app.handle_key_event(key);
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use monofn_common::Outcome;
    use serde_json::json;

    #[test]
    fn test_format_duration_ms() {
        assert_eq!(format_duration_ms(250), "250ms");
        assert_eq!(format_duration_ms(12_000), "12s");
        assert_eq!(format_duration_ms(125_000), "2m 5s");
        assert_eq!(format_duration_ms(7_260_000), "2h 1m");
    }

    #[test]
    fn test_result_detail() {
        let ok = InvocationResult::new("a", Outcome::Ok { output: json!({"x": 1}) }, Utc::now(), 1);
        assert_eq!(result_detail(&ok), r#"{"x":1}"#);

        let err = InvocationResult::new("b", Outcome::error("TypeError", "nope"), Utc::now(), 1);
        assert_eq!(result_detail(&err), "TypeError: nope");
    }

    #[test]
    fn test_snapshot_url_trims_slash() {
        let app = TopApp::new("http://127.0.0.1:8501/".into(), 500);
        assert_eq!(app.snapshot_url(), "http://127.0.0.1:8501/api/snapshot");
    }

    #[tokio::test]
    async fn test_failed_fetch_keeps_last_snapshot() {
        let mut app = TopApp::new("http://127.0.0.1:1".into(), 500);
        app.snapshot = Some(DashboardSnapshot::empty("kept"));
        app.update_snapshot().await;
        assert_eq!(app.snapshot.as_ref().unwrap().key, "kept");
        assert!(app.error_message.is_some());
    }
}
