//! # Editor Example
//!
//! An inline prompt that stays at the bottom of the shell instead of taking
//! over the screen:
//! - Entered lines are printed above the prompt with `Command::println`
//! - `ctrl+e` hands the terminal to `$EDITOR` with `Command::exec` and reads
//!   the file back when the editor exits
//! - `ctrl+z` suspends the program; `fg` brings it back
//! - Bracketed paste inserts pasted text in one go
//!
//! Run with: `cargo run --example editor`

use std::path::PathBuf;

use tapioca::{Command, Event, ExecCommand, Frame, Model, ProgramOptions};
use unicode_width::UnicodeWidthStr;

struct Editor {
    input: String,
    /// Cursor position in characters.
    cursor: usize,
    draft: PathBuf,
    status: String,
}

#[derive(Debug)]
enum Msg {
    EditorClosed(std::io::Result<std::process::ExitStatus>),
}

impl Editor {
    fn byte_index(&self) -> usize {
        self.input
            .char_indices()
            .nth(self.cursor)
            .map_or(self.input.len(), |(i, _)| i)
    }

    fn insert(&mut self, text: &str) {
        let at = self.byte_index();
        self.input.insert_str(at, text);
        self.cursor += text.chars().count();
    }

    fn submit(&mut self) -> Command<Msg> {
        let line = std::mem::take(&mut self.input);
        self.cursor = 0;
        if line.trim().is_empty() {
            return Command::none();
        }
        Command::println(format!("> {line}"))
    }

    fn open_editor(&mut self) -> Command<Msg> {
        if let Err(e) = std::fs::write(&self.draft, &self.input) {
            self.status = format!("cannot write draft: {e}");
            return Command::none();
        }
        let editor = std::env::var("EDITOR").unwrap_or_else(|_| "vi".into());
        Command::exec(
            ExecCommand::new(editor).arg(self.draft.display().to_string()),
            Msg::EditorClosed,
        )
    }
}

impl Model for Editor {
    type Message = Msg;
    type Flags = PathBuf;

    fn init(draft: PathBuf) -> (Self, Command<Msg>) {
        let editor = Editor {
            input: String::new(),
            cursor: 0,
            draft,
            status: "enter submits, ctrl+e opens $EDITOR, ctrl+z suspends, esc quits".into(),
        };
        (editor, Command::set_title("tapioca editor"))
    }

    fn update(&mut self, event: Event<Msg>) -> Command<Msg> {
        match event {
            Event::Key(key) if key.is_release() => {}
            Event::Key(key) if key.matches("esc") || key.matches("ctrl+c") => {
                return Command::quit()
            }
            Event::Key(key) if key.matches("enter") => return self.submit(),
            Event::Key(key) if key.matches("ctrl+e") => return self.open_editor(),
            Event::Key(key) if key.matches("ctrl+z") => return Command::suspend(),
            Event::Key(key) if key.matches("ctrl+l") => return Command::clear_screen(),
            Event::Key(key) if key.matches("backspace") => {
                if self.cursor > 0 {
                    self.cursor -= 1;
                    let at = self.byte_index();
                    self.input.remove(at);
                }
            }
            Event::Key(key) if key.matches("left") => self.cursor = self.cursor.saturating_sub(1),
            Event::Key(key) if key.matches("right") => {
                self.cursor = (self.cursor + 1).min(self.input.chars().count())
            }
            Event::Key(key) if key.matches("home") || key.matches("ctrl+a") => self.cursor = 0,
            Event::Key(key) if key.matches("end") => self.cursor = self.input.chars().count(),
            Event::Key(key) if !key.text.is_empty() => {
                let text = key.text.clone();
                self.insert(&text);
            }
            Event::Paste(text) => self.insert(&text.replace(['\r', '\n'], " ")),
            Event::Resume => self.status = "welcome back".into(),
            Event::App(Msg::EditorClosed(Ok(status))) if status.success() => {
                match std::fs::read_to_string(&self.draft) {
                    Ok(text) => {
                        self.input = text.trim_end().replace('\n', " ");
                        self.cursor = self.input.chars().count();
                        self.status = "draft loaded".into();
                    }
                    Err(e) => self.status = format!("cannot read draft: {e}"),
                }
            }
            Event::App(Msg::EditorClosed(Ok(status))) => {
                self.status = format!("editor exited with {status}")
            }
            Event::App(Msg::EditorClosed(Err(e))) => self.status = format!("cannot start editor: {e}"),
            _ => {}
        }
        Command::none()
    }

    fn view(&self) -> Frame {
        let prompt = "$ ";
        let before: String = self.input.chars().take(self.cursor).collect();
        let column = prompt.len() + before.width();
        Frame::new(format!(
            "{prompt}{}\n\x1b[2m{}\x1b[0m",
            self.input, self.status
        ))
        .with_cursor(u16::try_from(column).unwrap_or(u16::MAX), 0)
    }
}

#[tapioca::tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let draft = std::env::temp_dir().join(format!("tapioca-draft-{}.txt", std::process::id()));
    let options = ProgramOptions {
        alt_screen: false,
        ..ProgramOptions::from_env()
    };
    let model = tapioca::run_with::<Editor>(draft, options).await?;
    let _ = std::fs::remove_file(&model.draft);
    Ok(())
}
