//! # Tessera - display server core
//!
//! Runs an [`AppServer`] on a headless drawing engine. Clients in the same
//! process reach it through the bootstrap port; the binary mostly exists to
//! exercise configuration, logging and shutdown.

use anyhow::Result;
use clap::Parser;
use log::{error, info};
use parking_lot::Mutex;
use std::sync::Arc;

use tessera::desktop::DesktopSnapshot;
use tessera::{AppServer, HeadlessEngine, TesseraConfig};

#[derive(Parser)]
#[command(name = "tessera")]
#[command(about = "Display server core with exact window clipping and workspaces")]
#[command(version)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "~/.config/tessera/tessera.toml")]
    config: String,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    /// Override the screen width
    #[arg(long)]
    width: Option<u32>,

    /// Override the screen height
    #[arg(long)]
    height: Option<u32>,

    /// Override the number of workspaces
    #[arg(long)]
    workspaces: Option<u32>,

    /// Print the state of every desktop as JSON on exit
    #[arg(long)]
    dump_state: bool,
}

impl Cli {
    fn apply(&self, config: &mut TesseraConfig) {
        if let Some(width) = self.width {
            config.screen.width = width;
        }
        if let Some(height) = self.height {
            config.screen.height = height;
        }
        if let Some(count) = self.workspaces {
            config.workspaces.count = count;
            config.workspaces.initial = config.workspaces.initial.min(count.saturating_sub(1));
        }
    }
}

/// Stops the server, first capturing every desktop if `capture` is set.
/// The capture has to come first: stopping closes the sessions' windows.
fn stop_and_capture(server: &AppServer, capture: bool) -> Option<Vec<DesktopSnapshot>> {
    let snapshot = capture.then(|| server.snapshot());
    server.stop();
    snapshot
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    if cli.debug {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("debug")).init();
    } else {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    }

    info!("Starting Tessera {}", tessera::VERSION);
    if let (Some(date), Some(target)) = (option_env!("BUILD_DATE"), option_env!("TARGET_TRIPLE")) {
        info!("Built {} for {}", date, target);
    }

    let mut config = match TesseraConfig::load(&cli.config) {
        Ok(config) => {
            info!("Configuration loaded from: {}", cli.config);
            config
        }
        Err(e) => {
            error!("Failed to load configuration: {:#}", e);
            info!("Using default configuration");
            TesseraConfig::default()
        }
    };
    cli.apply(&mut config);
    config.validate()?;

    let engine = Arc::new(HeadlessEngine::new(config.screen.width, config.screen.height));
    let server = Arc::new(AppServer::new(config, engine));

    let captured = Arc::new(Mutex::new(None));
    let stopper = server.clone();
    let slot = captured.clone();
    let dump_state = cli.dump_state;
    ctrlc::set_handler(move || {
        // held across the stop so main cannot read the slot before it is filled
        let mut slot = slot.lock();
        *slot = stop_and_capture(&stopper, dump_state);
    })?;

    info!("Tessera is ready, bootstrap port {}", server.port().id());
    server.run()?;
    let snapshot = captured.lock().take().or_else(|| stop_and_capture(&server, cli.dump_state));
    server.shutdown();

    if let Some(snapshot) = snapshot {
        println!("{}", serde_json::to_string_pretty(&snapshot)?);
    }
    info!("Tessera shut down");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Duration;
    use tessera::geometry::Rect;
    use tessera::ipc::{self, PortHandle};
    use tessera::protocol::{Request, WindowSpec};
    use tessera::window::{WindowFeel, WindowFlags, WindowLook};

    fn call(port: &PortHandle, request: Request) -> ipc::Message {
        let (reply_port, mut replies) = ipc::port("test reply");
        port.send(request.to_message().with_port(reply_port)).unwrap();
        replies.recv_timeout(Duration::from_secs(2)).unwrap().expect("reply")
    }

    #[test]
    fn test_state_dump_sees_open_windows() {
        let server = Arc::new(AppServer::new(TesseraConfig::default(), Arc::new(HeadlessEngine::new(640, 480))));
        let runner = server.clone();
        let bootstrap = thread::spawn(move || runner.run());

        let session = call(&server.port(), Request::GetDesktop { user_id: 1 }).port.unwrap();
        let (events, mut inbox) = ipc::port("client");
        let spec = WindowSpec {
            frame: Rect::new(0, 0, 100, 100),
            look: WindowLook::NoBorder,
            feel: WindowFeel::Normal,
            flags: WindowFlags::empty(),
            workspaces: 0,
            title: "dumped".to_string(),
            team: 1,
        };
        session.send(Request::CreateWindow(spec).to_message().with_port(events)).unwrap();
        inbox.recv_timeout(Duration::from_secs(2)).unwrap().expect("window reply");

        let snapshot = stop_and_capture(&server, true).unwrap();
        bootstrap.join().unwrap().unwrap();
        server.shutdown();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].state.windows.len(), 1);
        assert!(server.snapshot()[0].state.windows.is_empty());
        assert!(stop_and_capture(&server, false).is_none());
    }

    #[test]
    fn test_cli_parsing() {
        let cli = Cli::try_parse_from(["tessera"]).unwrap();
        assert!(!cli.debug);
        assert!(!cli.dump_state);
        assert_eq!(cli.width, None);
    }

    #[test]
    fn test_cli_overrides() {
        let cli = Cli::try_parse_from(["tessera", "--width", "640", "--height", "480", "--workspaces", "2"]).unwrap();
        let mut config = TesseraConfig::default();
        config.workspaces.initial = 3;
        cli.apply(&mut config);
        assert_eq!((config.screen.width, config.screen.height), (640, 480));
        assert_eq!(config.workspaces.count, 2);
        assert_eq!(config.workspaces.initial, 1);
        assert!(config.validate().is_ok());
    }
}
