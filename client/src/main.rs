mod generator;

use anyhow::{Context, Result};
use crossterm::{
    event::{self, Event, KeyCode, KeyEventKind, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    prelude::*,
    widgets::{Block, Borders, Paragraph, Wrap},
};
use std::io;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;

use generator::{generate, GenerateEvent, Generator};

const DEFAULT_SERVER: &str = "http://127.0.0.1:3000";
const LOG_FILE: &str = "testgen-client.log";
const SPINNER: [&str; 4] = ["|", "/", "-", "\\"];

struct App {
    generator: Generator,
    http: reqwest::Client,
    server: String,
    tx: mpsc::Sender<GenerateEvent>,
    started: Instant,
}

impl App {
    fn new(server: String, tx: mpsc::Sender<GenerateEvent>) -> Self {
        Self {
            generator: Generator::default(),
            http: reqwest::Client::new(),
            server,
            tx,
            started: Instant::now(),
        }
    }

    fn submit(&mut self) {
        if let Some(snippet) = self.generator.handle_generate() {
            tokio::spawn(generate(
                self.http.clone(),
                self.server.clone(),
                snippet,
                self.tx.clone(),
            ));
        }
    }

    fn spinner(&self) -> &'static str {
        let frame = self.started.elapsed().as_millis() / 120;
        SPINNER[frame as usize % SPINNER.len()]
    }
}

/// The terminal belongs to the UI, so logs only go to a file and only when
/// `RUST_LOG` asks for them.
fn init_logging() -> Result<()> {
    let Ok(filter) = tracing_subscriber::EnvFilter::try_from_default_env() else {
        return Ok(());
    };

    let file = std::fs::File::create(LOG_FILE).context("Failed to create log file")?;
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::sync::Mutex::new(file))
        .with_ansi(false)
        .init();
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logging()?;

    let server = std::env::args()
        .nth(1)
        .unwrap_or_else(|| DEFAULT_SERVER.to_string());
    tracing::info!("using server {}", server);

    // Generation tasks report back to the UI loop
    let (tx, rx) = mpsc::channel::<GenerateEvent>(32);

    // Setup Terminal
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let result = run(&mut terminal, App::new(server, tx), rx).await;

    // Restore Terminal
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    result
}

async fn run<B: Backend>(
    terminal: &mut Terminal<B>,
    mut app: App,
    mut rx: mpsc::Receiver<GenerateEvent>,
) -> Result<()> {
    loop {
        terminal.draw(|f| ui(f, &app))?;

        tokio::select! {
            Some(event) = rx.recv() => app.generator.apply(event),
            _ = tokio::time::sleep(Duration::from_millis(16)) => {}
        }

        while event::poll(Duration::ZERO)? {
            let Event::Key(key) = event::read()? else {
                continue;
            };
            if key.kind != KeyEventKind::Press {
                continue;
            }

            match key.code {
                KeyCode::Esc => return Ok(()),
                KeyCode::Char('g') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                    app.submit();
                }
                KeyCode::Char(c) => app.generator.input.push(c),
                KeyCode::Tab => app.generator.input.push('\t'),
                KeyCode::Enter => app.generator.input.push('\n'),
                KeyCode::Backspace => {
                    app.generator.input.pop();
                }
                _ => {}
            }
        }
    }
}

fn ui(f: &mut Frame, app: &App) {
    let state = &app.generator;

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(10),
            Constraint::Length(1),
            Constraint::Min(1),
        ])
        .split(f.area());

    let input = Paragraph::new(state.input.as_str())
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title("Paste your code snippet (Ctrl+G generate, Esc quit)"),
        )
        .wrap(Wrap { trim: false });
    f.render_widget(input, chunks[0]);

    let status = if state.loading {
        Line::from(format!("{} Generating...", app.spinner()))
    } else if let Some(error) = &state.error {
        Line::from(vec![
            Span::styled("Error: ", Style::default().bold()),
            Span::raw(error.as_str()),
        ])
        .red()
    } else {
        Line::from("Ready")
    };
    f.render_widget(Paragraph::new(status), chunks[1]);

    if !state.response.is_empty() {
        let response = Paragraph::new(state.response.as_str())
            .block(
                Block::default()
                    .borders(Borders::ALL)
                    .title("Generated Test Cases"),
            )
            .wrap(Wrap { trim: false });
        f.render_widget(response, chunks[2]);
    }
}
