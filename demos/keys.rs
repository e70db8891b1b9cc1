//! # Keys Example
//!
//! An event inspector: every key, mouse action, paste, focus change and
//! terminal reply is printed above a small status block.  Useful for
//! checking what a terminal actually sends.
//!
//! - Mouse reporting, focus reporting and kitty keyboard flags are switched on
//!   through [`ProgramOptions`]
//! - Terminal queries are issued with `Command::batch`
//! - Set `TAPIOCA_LOG_FILE=keys.log` to see the runtime's own tracing output
//!
//! Run with: `cargo run --example keys`

use tapioca::crossterm::event::KeyboardEnhancementFlags;
use tapioca::{
    CapabilityEvent, Command, Event, Frame, Model, MouseMode, ProgramHandle, ProgramOptions,
};

struct Keys {
    seen: usize,
    last: String,
    focused: bool,
    background: Option<String>,
}

impl Model for Keys {
    type Message = ();
    type Flags = ();

    fn init(_: ()) -> (Self, Command<()>) {
        let keys = Keys {
            seen: 0,
            last: String::new(),
            focused: true,
            background: None,
        };
        let queries = Command::batch([
            Command::request_background_color(),
            Command::request_keyboard_enhancements(),
            Command::request_terminal_version(),
            Command::request_cursor_position(),
        ]);
        (keys, queries)
    }

    fn update(&mut self, event: Event<()>) -> Command<()> {
        self.seen += 1;
        let line = match &event {
            Event::Key(key) if key.matches("ctrl+c") => return Command::quit(),
            Event::Key(key) => format!("key      {key} ({:?}, text {:?})", key.kind, key.text),
            Event::Mouse(mouse) => format!("mouse    {mouse} at {},{}", mouse.column, mouse.row),
            Event::Paste(text) => format!("paste    {} bytes: {text:?}", text.len()),
            Event::Resize { columns, rows } => format!("resize   {columns}x{rows}"),
            Event::Focus => {
                self.focused = true;
                "focus".to_string()
            }
            Event::Blur => {
                self.focused = false;
                "blur".to_string()
            }
            Event::Capability(CapabilityEvent::BackgroundColor(rgb)) => {
                let dark = if rgb.is_dark() { "dark" } else { "light" };
                self.background = Some(format!("{rgb:?} ({dark})"));
                format!("reply    background {rgb:?}")
            }
            Event::Capability(reply) => format!("reply    {reply:?}"),
            Event::Resume => "resumed".to_string(),
            Event::CommandFailed(e) => format!("failed   {e}"),
            Event::Tick(_) | Event::App(()) | Event::Quit => return Command::none(),
        };
        self.last = line.clone();
        Command::println(line)
    }

    fn view(&self) -> Frame {
        let focus = if self.focused { "focused" } else { "unfocused" };
        let background = self.background.as_deref().unwrap_or("unknown");
        Frame::new(format!(
            "\x1b[7m {} events, {focus}, background {background} \x1b[0m\n\x1b[2mlast: {}\x1b[0m\n\x1b[2mctrl+c to quit\x1b[0m",
            self.seen, self.last
        ))
    }
}

#[tapioca::tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let options = ProgramOptions {
        alt_screen: false,
        mouse_mode: Some(MouseMode::AllMotion),
        focus_reporting: true,
        keyboard_enhancements: KeyboardEnhancementFlags::DISAMBIGUATE_ESCAPE_CODES
            | KeyboardEnhancementFlags::REPORT_EVENT_TYPES
            | KeyboardEnhancementFlags::REPORT_ALL_KEYS_AS_ESCAPE_CODES,
        handle_signals: true,
        ..ProgramOptions::from_env()
    };
    let program = tapioca::Program::<Keys>::with_options((), options)?;
    let handle: ProgramHandle<()> = program.handle();
    let model = program.run().await?;
    let caps = handle.capabilities();
    println!(
        "{} events; colour profile {:?}, keyboard enhancements {}",
        model.seen,
        caps.color_profile,
        caps.supports_keyboard_enhancements()
    );
    Ok(())
}
