//! # Counter Example
//!
//! A minimal counter app demonstrating the core tapioca architecture:
//! - Implementing the [`Model`] trait with `init`, `update`, `view`, and `subscriptions`
//! - Matching key events directly in `update`
//! - Drawing the view with ratatui widgets through [`Frame::draw`]
//! - Asking for confirmation before quitting with [`confirm_quit`]
//!
//! Run with: `cargo run --example counter`

use std::time::{Duration, Instant};

use tapioca::ratatui::layout::{Alignment, Constraint, Layout};
use tapioca::ratatui::style::{Color, Modifier, Style};
use tapioca::ratatui::text::{Line, Span};
use tapioca::ratatui::widgets::{Block, Borders, Paragraph};
use tapioca::{confirm_quit, ticks, Command, Event, Frame, Model, Program, Subscription};

/// A minimal counter app that validates the core loop.
struct Counter {
    count: i64,
    size: (u16, u16),
    started: Instant,
    elapsed: Duration,
    confirming: bool,
}

#[derive(Debug)]
enum Msg {
    ConfirmQuit,
}

impl Model for Counter {
    type Message = Msg;
    type Flags = ();

    fn init(_: ()) -> (Self, Command<Msg>) {
        let counter = Counter {
            count: 0,
            size: (80, 24),
            started: Instant::now(),
            elapsed: Duration::ZERO,
            confirming: false,
        };
        (counter, Command::window_size())
    }

    fn update(&mut self, event: Event<Msg>) -> Command<Msg> {
        if let Event::Key(key) = &event {
            if key.is_release() {
                return Command::none();
            }
            self.confirming = false;
        }
        match event {
            Event::Key(key) if key.matches("q") || key.matches("esc") => return Command::quit(),
            Event::Key(key) if key.matches("up") || key.matches("k") => self.count += 1,
            Event::Key(key) if key.matches("down") || key.matches("j") => self.count -= 1,
            Event::Key(key) if key.matches("r") => self.count = 0,
            Event::Resize { columns, rows } => self.size = (columns, rows),
            Event::Tick(now) => self.elapsed = now.duration_since(self.started),
            Event::App(Msg::ConfirmQuit) => self.confirming = true,
            _ => {}
        }
        Command::none()
    }

    fn view(&self) -> Frame {
        let count_style = if self.count > 0 {
            Style::default()
                .fg(Color::Green)
                .add_modifier(Modifier::BOLD)
        } else if self.count < 0 {
            Style::default().fg(Color::Red).add_modifier(Modifier::BOLD)
        } else {
            Style::default()
                .fg(Color::White)
                .add_modifier(Modifier::BOLD)
        };

        let footer = if self.confirming {
            Line::styled("Press ctrl+c again to quit", Style::default().fg(Color::Yellow))
        } else {
            Line::from(vec![
                Span::styled("↑/k", Style::default().fg(Color::Cyan)),
                Span::raw(" inc  "),
                Span::styled("↓/j", Style::default().fg(Color::Cyan)),
                Span::raw(" dec  "),
                Span::styled("r", Style::default().fg(Color::Cyan)),
                Span::raw(" reset  "),
                Span::styled("q", Style::default().fg(Color::Cyan)),
                Span::raw(" quit"),
            ])
        };

        let text = vec![
            Line::from(Span::styled(format!("Count: {}", self.count), count_style)),
            Line::raw(format!("{}s", self.elapsed.as_secs())),
            footer,
        ];

        Frame::draw(self.size.0, self.size.1, |frame| {
            let [_, mid, _] = Layout::vertical([
                Constraint::Fill(1),
                Constraint::Length(5),
                Constraint::Fill(1),
            ])
            .areas(frame.area());

            let block = Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(Color::Cyan))
                .title(" Counter ");
            let paragraph = Paragraph::new(text)
                .block(block)
                .alignment(Alignment::Center);
            frame.render_widget(paragraph, mid);
        })
    }

    fn subscriptions(&self) -> Vec<Subscription<Msg>> {
        vec![ticks(Duration::from_secs(1))]
    }
}

#[tapioca::tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let program = Program::<Counter>::new(())?
        .with_filter(confirm_quit(Duration::from_secs(2), || Msg::ConfirmQuit));
    let model = program.run().await?;
    println!("Final count: {}", model.count);
    Ok(())
}
