//! firesense - fire detection video player
//!
//! This binary:
//! 1. Loads player settings (config file, `FIRESENSE_*` env, flags)
//! 2. Builds the detector and annotator
//! 3. Plays the selected source at its native frame rate
//! 4. In interactive mode, takes the UI's source-selection commands on stdin

use anyhow::{anyhow, bail, Context, Result};
use clap::Parser;
use std::io::BufRead;
use std::path::PathBuf;
use std::sync::mpsc;
use std::time::{Duration, Instant};

use firesense::config::parse_display_size;
use firesense::display::DisplayArea;
use firesense::ui::{Ui, UiMode};
use firesense::{
    assemble_pump, FrameSourceDescriptor, LatestFrameSink, PipelineState, PlayerConfig,
    PumpHandle, PumpRunner, UiEvent,
};

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Play a camera, video file or network stream through the fire detector"
)]
struct Args {
    /// Config file (JSON, or TOML when the name ends in .toml).
    #[arg(long, env = "FIRESENSE_CONFIG")]
    config: Option<PathBuf>,

    /// Source to play: a device index ("0"), a file path, or a stream URL.
    #[arg(long)]
    source: Option<String>,

    /// Detector backend: stub, cpu or tract.
    #[arg(long)]
    detector: Option<String>,

    /// Annotator style: manual or imageproc.
    #[arg(long)]
    annotator: Option<String>,

    /// Display area as WIDTHxHEIGHT; frames are scaled to fit.
    #[arg(long, value_parser = parse_display_size)]
    display: Option<DisplayArea>,

    /// Read camera/upload/ip/reset/status/quit commands from stdin.
    #[arg(long)]
    interactive: bool,

    /// Stop a headless run after this many seconds.
    #[arg(long)]
    max_seconds: Option<u64>,

    /// Progress output style.
    #[arg(long, value_enum, default_value_t = UiMode::Auto)]
    ui: UiMode,
}

enum Input {
    Line(String),
    Interrupt,
    Closed,
}

#[derive(Debug, PartialEq)]
enum Command {
    Event(UiEvent),
    Status,
    Help,
    Quit,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let ui = Ui::detect(args.ui);

    let config = {
        let stage = ui.stage("load settings");
        match load_config(&args) {
            Ok(config) => config,
            Err(err) => {
                stage.fail(format!("{err:#}"));
                return Err(err);
            }
        }
    };

    let sink = LatestFrameSink::new(Some(config.display));
    let pump = {
        let stage = ui.stage(&format!("load detector ({})", config.detector.backend));
        match assemble_pump(&config, Box::new(sink.clone())) {
            Ok(pump) => pump,
            Err(err) => {
                stage.fail(format!("{err:#}"));
                return Err(err);
            }
        }
    };
    let runner = PumpRunner::spawn(pump, config.uploads.clone())?;
    let handle = runner.handle();

    let (tx, rx) = mpsc::channel();
    let interrupt_tx = tx.clone();
    ctrlc::set_handler(move || {
        let _ = interrupt_tx.send(Input::Interrupt);
    })
    .context("error setting Ctrl-C handler")?;

    let outcome = if args.interactive {
        spawn_stdin_reader(tx)?;
        if let Some(source) = config.source.clone() {
            open_source(&ui, &handle, source);
        }
        run_interactive(&ui, &handle, &rx);
        Ok(())
    } else {
        drop(tx);
        let source = config
            .source
            .clone()
            .ok_or_else(|| anyhow!("no source given; pass --source or use --interactive"))?;
        open_source(&ui, &handle, source);
        run_headless(&ui, &handle, &rx, args.max_seconds.map(Duration::from_secs))
    };

    log::info!("shutting down; {} frames shown", sink.published());
    runner.stop()?;
    outcome
}

fn load_config(args: &Args) -> Result<PlayerConfig> {
    let mut config = PlayerConfig::load_from(args.config.as_deref())?;
    if let Some(source) = &args.source {
        config.source = Some(source.parse()?);
    }
    if let Some(detector) = &args.detector {
        config.detector.backend = detector.clone();
    }
    if let Some(style) = &args.annotator {
        config.annotator.style = style.parse()?;
    }
    if let Some(display) = args.display {
        config.display = display;
    }
    config.validate()?;
    Ok(config)
}

fn open_source(ui: &Ui, handle: &PumpHandle, source: FrameSourceDescriptor) {
    let stage = ui.stage(&format!("open {}", source));
    if let Err(err) = handle.select_source(source) {
        stage.fail(err.to_string());
    }
}

fn run_headless(
    ui: &Ui,
    handle: &PumpHandle,
    rx: &mpsc::Receiver<Input>,
    limit: Option<Duration>,
) -> Result<()> {
    let started = Instant::now();
    loop {
        let state = handle.wait_while_running(Duration::from_millis(250));
        if !state.is_running() {
            break;
        }
        if matches!(rx.try_recv(), Ok(Input::Interrupt)) {
            log::info!("interrupted");
            break;
        }
        if limit.is_some_and(|limit| started.elapsed() >= limit) {
            log::info!("time limit reached");
            break;
        }
    }

    let state = handle.state();
    ui.status(&state, &handle.stats());
    match state {
        PipelineState::Failed(err) => Err(err.into()),
        _ => Ok(()),
    }
}

fn run_interactive(ui: &Ui, handle: &PumpHandle, rx: &mpsc::Receiver<Input>) {
    eprintln!("{}", HELP);
    while let Ok(input) = rx.recv() {
        let line = match input {
            Input::Line(line) => line,
            Input::Interrupt | Input::Closed => break,
        };
        match parse_command(&line) {
            Ok(Some(Command::Event(event))) => {
                if let Err(err) = handle.dispatch(event) {
                    eprintln!("{}", err);
                }
                ui.status(&handle.state(), &handle.stats());
            }
            Ok(Some(Command::Status)) => ui.status(&handle.state(), &handle.stats()),
            Ok(Some(Command::Help)) => eprintln!("{}", HELP),
            Ok(Some(Command::Quit)) => break,
            Ok(None) => {}
            Err(err) => eprintln!("{err}"),
        }
    }
}

const HELP: &str = "commands: camera | upload <path> | ip <url> | reset | status | help | quit";

fn parse_command(line: &str) -> Result<Option<Command>> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }
    let (word, rest) = line.split_once(char::is_whitespace).unwrap_or((line, ""));
    let rest = rest.trim();
    let command = match word.to_ascii_lowercase().as_str() {
        "camera" => Command::Event(UiEvent::UseCamera),
        "upload" => {
            if rest.is_empty() {
                bail!("usage: upload <path>");
            }
            Command::Event(UiEvent::UploadVideo(PathBuf::from(rest)))
        }
        "ip" => Command::Event(UiEvent::EnterAddress(rest.to_string())),
        "reset" => Command::Event(UiEvent::Reset),
        "status" => Command::Status,
        "help" | "?" => Command::Help,
        "quit" | "exit" => Command::Quit,
        other => bail!("unknown command '{}'; {}", other, HELP),
    };
    Ok(Some(command))
}

fn spawn_stdin_reader(tx: mpsc::Sender<Input>) -> Result<()> {
    std::thread::Builder::new()
        .name("stdin".to_string())
        .spawn(move || {
            for line in std::io::stdin().lock().lines() {
                match line {
                    Ok(line) => {
                        if tx.send(Input::Line(line)).is_err() {
                            return;
                        }
                    }
                    Err(err) => {
                        log::warn!("stdin read failed: {}", err);
                        break;
                    }
                }
            }
            let _ = tx.send(Input::Closed);
        })
        .context("spawn stdin reader")?;
    Ok(())
}
