//! Wavescope CLI: terminal audio player with waveform and spectrum

use std::io;
use std::os::unix::io::AsRawFd;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use clap::Parser;
use crossbeam_channel::Receiver;

use crossterm::event::{self, Event, KeyCode, KeyEventKind};
use crossterm::terminal::{self, EnterAlternateScreen, LeaveAlternateScreen};
use crossterm::ExecutableCommand;
use ratatui::prelude::*;
use ratatui::symbols::Marker;
use ratatui::widgets::canvas::{Canvas, Line as CanvasLine};
use ratatui::widgets::*;

use wavescope::audio::{AssetSource, PlaybackManager, PlaybackState, PlayerEvent, VolumeLevel};
use wavescope::visual::{
    bar_levels, playhead_x, FrameData, FramePresenter, LoopKey, RenderLoop, WaveformPoint,
};

/// Number of bars in the spectrum panel
const SPECTRUM_BARS: usize = 32;

#[derive(Parser, Debug)]
#[command(name = "wavescope", about = "Terminal audio player with waveform and spectrum", version)]
struct Cli {
    /// Audio URL (http/https) or file path
    source: String,

    /// Initial volume level
    #[arg(long, default_value_t = 5, value_parser = clap::value_parser!(i32).range(1..=10))]
    volume: i32,

    /// Display refresh rate in frames per second
    #[arg(long, default_value_t = 60, value_parser = clap::value_parser!(u64).range(1..=240))]
    fps: u64,

    /// Write logs to this file (the terminal UI owns stderr)
    #[arg(long)]
    log_file: Option<PathBuf>,

    /// Start playing as soon as the audio is loaded
    #[arg(long)]
    autoplay: bool,
}

struct App {
    source: String,
    frame: FrameData,
    spectrum: Vec<u64>,
    canvas_width: f64,
    canvas_height: f64,
    state: PlaybackState,
    volume: VolumeLevel,
    status: String,
    running: bool,
}

impl App {
    fn new(source: &str) -> Self {
        Self {
            source: source.to_string(),
            frame: FrameData::default(),
            spectrum: vec![0; SPECTRUM_BARS],
            canvas_width: 1.0,
            canvas_height: 1.0,
            state: PlaybackState::Idle,
            volume: VolumeLevel::default(),
            status: "Ready".to_string(),
            running: true,
        }
    }

    fn on_event(&mut self, event: PlayerEvent) {
        match event {
            PlayerEvent::Loaded { .. } | PlayerEvent::Reset => self.status = "Ready".to_string(),
            PlayerEvent::Playing | PlayerEvent::Resumed => self.status = "Playing".to_string(),
            PlayerEvent::Paused => self.status = "Paused".to_string(),
            PlayerEvent::Ended => self.status = "Finished".to_string(),
            PlayerEvent::Error(msg) => self.status = format!("Error: {}", msg),
            PlayerEvent::VolumeChanged(_) => {}
        }
    }
}

impl FramePresenter for App {
    fn present(&mut self, frame: &FrameData) {
        self.frame = frame.clone();
        self.spectrum = match frame.spectrum {
            Some(ref snapshot) => bar_levels(snapshot, SPECTRUM_BARS)
                .into_iter()
                .map(|level| (level * 100.0).round() as u64)
                .collect(),
            None => vec![0; SPECTRUM_BARS],
        };
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_logging(cli.log_file.as_deref())?;

    let mut player = match PlaybackManager::open_default() {
        Ok(p) => p,
        Err(e) => {
            eprintln!("Audio error: {}", e);
            std::process::exit(1);
        }
    };

    // Load before entering the TUI so failures print normally
    eprintln!("Loading {}...", cli.source);
    if let Err(e) = player.load(&AssetSource::parse(&cli.source)) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
    player.set_volume(cli.volume);

    let events = player.events();
    let mut app = App::new(&cli.source);
    let mut render =
        RenderLoop::default().with_interval(Duration::from_millis(1000 / cli.fps.max(1)));

    if cli.autoplay {
        player.play();
    }

    // ALSA and PulseAudio write diagnostics to stderr, which corrupts the display
    let stderr_restore = silence_stderr()?;
    let result = run_tui(&mut player, &mut app, &mut render, &events);

    // Close the player before stderr comes back
    render.cancel();
    player.close();
    drop(stderr_restore);

    result?;
    Ok(())
}

/// Runs a closure when dropped, on early return and unwinding alike
struct OnDrop<F: FnOnce()>(Option<F>);

impl<F: FnOnce()> OnDrop<F> {
    fn new(f: F) -> Self {
        Self(Some(f))
    }
}

impl<F: FnOnce()> Drop for OnDrop<F> {
    fn drop(&mut self) {
        if let Some(f) = self.0.take() {
            f();
        }
    }
}

/// Point fd 2 at `/dev/null` until the returned guard drops
fn silence_stderr() -> io::Result<OnDrop<impl FnOnce()>> {
    let devnull = std::fs::File::open("/dev/null")?;
    let saved = unsafe { libc::dup(2) };
    unsafe { libc::dup2(devnull.as_raw_fd(), 2) };
    Ok(OnDrop::new(move || {
        if saved >= 0 {
            unsafe {
                libc::dup2(saved, 2);
                libc::close(saved);
            }
        }
    }))
}

fn run_tui(
    player: &mut PlaybackManager,
    app: &mut App,
    render: &mut RenderLoop,
    events: &Receiver<PlayerEvent>,
) -> io::Result<()> {
    terminal::enable_raw_mode()?;
    let _restore = OnDrop::new(|| {
        let _ = io::stdout().execute(LeaveAlternateScreen);
        let _ = terminal::disable_raw_mode();
    });
    io::stdout().execute(EnterAlternateScreen)?;
    let mut terminal = Terminal::new(CrosstermBackend::new(io::stdout()))?;

    while app.running {
        player.poll();
        for event in events.try_iter() {
            app.on_event(event);
        }
        app.state = player.state();
        app.volume = player.volume();

        // Waveform resolution follows the braille grid of its panel
        let size = terminal.size()?;
        let wave = waveform_canvas(Rect::new(0, 0, size.width, size.height));
        app.canvas_width = (wave.width as f64 * 2.0).max(1.0);
        app.canvas_height = (wave.height as f64 * 4.0).max(1.0);
        render.set_canvas(app.canvas_width as usize, app.canvas_height as f32);

        render.sync(LoopKey::of(player));
        if render.pump(Instant::now(), &*player, app) {
            terminal.draw(|f| draw_ui(f, app))?;
        }

        let timeout = render.time_to_next_frame(Instant::now());
        if event::poll(timeout)? {
            if let Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press {
                    handle_key(key.code, player, app);
                }
            }
        }
    }
    Ok(())
}

/// Send logs to `path`; without one, logging stays off
fn init_logging(path: Option<&Path>) -> io::Result<()> {
    let Some(path) = path else {
        return Ok(());
    };
    let file = std::fs::File::create(path)?;
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .target(env_logger::Target::Pipe(Box::new(file)))
        .init();
    log::info!("wavescope {} starting up", env!("CARGO_PKG_VERSION"));
    Ok(())
}

fn handle_key(code: KeyCode, player: &mut PlaybackManager, app: &mut App) {
    match code {
        KeyCode::Char('q') | KeyCode::Esc => {
            app.running = false;
        }
        KeyCode::Char(' ') => match player.state() {
            PlaybackState::Idle => player.play(),
            PlaybackState::Playing => player.pause(),
            PlaybackState::Paused => player.resume(),
        },
        KeyCode::Char('r') => player.reset(),
        KeyCode::Char('+') | KeyCode::Char('=') => player.step_volume(1),
        KeyCode::Char('-') => player.step_volume(-1),
        _ => {}
    }
}

fn layout(area: Rect) -> [Rect; 4] {
    let outer = Block::default().borders(Borders::ALL);
    let inner = outer.inner(area);
    let rows = Layout::vertical([
        Constraint::Min(6),     // waveform
        Constraint::Length(8),  // spectrum
        Constraint::Length(1),  // time + status
        Constraint::Length(1),  // help bar
    ])
    .split(inner);
    [rows[0], rows[1], rows[2], rows[3]]
}

/// Drawable area inside the waveform panel's border
fn waveform_canvas(area: Rect) -> Rect {
    Block::default().borders(Borders::ALL).inner(layout(area)[0])
}

fn draw_ui(f: &mut Frame, app: &App) {
    let area = f.area();

    let outer = Block::default()
        .title(format!(" Wavescope v{} ", env!("CARGO_PKG_VERSION")))
        .title_alignment(Alignment::Center)
        .borders(Borders::ALL)
        .border_type(BorderType::Rounded);
    f.render_widget(outer, area);

    let [wave, spectrum, status, help] = layout(area);
    draw_waveform(f, app, wave);
    draw_spectrum(f, app, spectrum);
    draw_status(f, app, status);
    draw_help(f, app, help);
}

fn draw_waveform(f: &mut Frame, app: &App, area: Rect) {
    let block = Block::default()
        .title(format!(" {} ", truncate_str(&app.source, area.width.saturating_sub(4) as usize)))
        .borders(Borders::ALL)
        .border_type(BorderType::Rounded)
        .border_style(Style::default().fg(Color::DarkGray));

    let width = app.canvas_width;
    let height = app.canvas_height;
    let playhead = playhead_x(app.frame.current_time, app.frame.duration, width as usize) as f64;
    let canvas = Canvas::default()
        .block(block)
        .marker(Marker::Braille)
        .x_bounds([0.0, width])
        .y_bounds([0.0, height])
        .paint(|ctx| {
            draw_polyline(ctx, &app.frame.played, Color::Cyan);
            // join the two halves so the line has no gap at the playhead
            if let (Some(last), Some(first)) = (app.frame.played.last(), app.frame.remaining.first()) {
                draw_polyline(ctx, &[*last, *first], Color::DarkGray);
            }
            draw_polyline(ctx, &app.frame.remaining, Color::DarkGray);
            if app.frame.duration > 0.0 {
                ctx.draw(&CanvasLine {
                    x1: playhead,
                    y1: 0.0,
                    x2: playhead,
                    y2: height,
                    color: Color::White,
                });
            }
        });
    f.render_widget(canvas, area);
}

fn draw_polyline(ctx: &mut ratatui::widgets::canvas::Context, points: &[WaveformPoint], color: Color) {
    for pair in points.windows(2) {
        ctx.draw(&CanvasLine {
            x1: pair[0].x as f64,
            y1: pair[0].y as f64,
            x2: pair[1].x as f64,
            y2: pair[1].y as f64,
            color,
        });
    }
}

fn draw_spectrum(f: &mut Frame, app: &App, area: Rect) {
    let block = Block::default()
        .title(" Spectrum ")
        .borders(Borders::ALL)
        .border_type(BorderType::Rounded)
        .border_style(Style::default().fg(Color::DarkGray));

    let sparkline = Sparkline::default()
        .block(block)
        .data(&app.spectrum)
        .max(100)
        .style(Style::default().fg(Color::Magenta));

    f.render_widget(sparkline, area);
}

fn draw_status(f: &mut Frame, app: &App, area: Rect) {
    let status_color = match app.state {
        PlaybackState::Playing => Color::Green,
        PlaybackState::Paused => Color::Yellow,
        PlaybackState::Idle if app.status.starts_with("Error") => Color::Red,
        PlaybackState::Idle => Color::DarkGray,
    };
    let line = Line::from(vec![
        Span::styled(
            format!(
                "  {} / {}",
                format_time(app.frame.current_time),
                format_time(app.frame.duration)
            ),
            Style::default().fg(Color::White).bold(),
        ),
        Span::raw("  "),
        Span::styled(&app.status, Style::default().fg(status_color)),
    ]);
    f.render_widget(Paragraph::new(line), area);
}

fn draw_help(f: &mut Frame, app: &App, area: Rect) {
    let toggle = match app.state {
        PlaybackState::Idle => "play",
        PlaybackState::Playing => "pause",
        PlaybackState::Paused => "resume",
    };

    let help = Line::from(vec![
        Span::styled("  'space' ", Style::default().fg(Color::Yellow)),
        Span::raw(format!("{}  |  ", toggle)),
        Span::styled("'r' ", Style::default().fg(Color::Yellow)),
        Span::raw("reset  |  "),
        Span::styled("'+'/'-' ", Style::default().fg(Color::Yellow)),
        Span::raw("volume  |  "),
        Span::styled("'q' ", Style::default().fg(Color::Yellow)),
        Span::raw("quit  |  "),
        Span::styled(
            format!("Vol: {}", app.volume),
            Style::default().fg(Color::Cyan).bold(),
        ),
    ]);

    f.render_widget(Paragraph::new(help).alignment(Alignment::Left), area);
}

/// `MM:SS`, minutes growing past 99 when needed
fn format_time(seconds: f64) -> String {
    let total = if seconds.is_finite() && seconds > 0.0 {
        seconds.floor() as u64
    } else {
        0
    };
    format!("{:02}:{:02}", total / 60, total % 60)
}

fn truncate_str(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else if max > 3 {
        let head: String = s.chars().take(max - 3).collect();
        format!("{}...", head)
    } else {
        s.chars().take(max).collect()
    }
}
