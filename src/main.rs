#[cfg(not(feature = "cli"))]
fn main() {
    eprintln!(
        "The ym-serial player requires the \"cli\" feature. Rebuild with `--features cli` to enable it."
    );
}

#[cfg(feature = "cli")]
mod cli {
    use anyhow::{bail, Context};
    use clap::Parser;
    use std::io::{self, BufRead};
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::thread;

    use ym2149_serial::replayer::{drive, PlaybackSession};
    use ym2149_serial::transport::{NullTransport, Transport, WriterTransport};
    use ym2149_serial::ym_loader::group_by_song;
    use ym2149_serial::PlayerConfig;

    #[derive(Parser, Debug)]
    #[command(name = "ym-serial")]
    #[command(about = "Stream YM chiptunes to YM2149 chips over a serial link")]
    struct Args {
        /// Song files; `name.1.ym`, `name.2.ym`, `name.3.ym` play together on chips 1-3
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Serial device to write register packets to
        #[arg(short, long)]
        device: Option<PathBuf>,

        /// Decode and pace playback without writing to a device
        #[arg(long)]
        dry_run: bool,

        /// JSON configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Loop each song instead of advancing
        #[arg(long)]
        repeat: bool,

        /// Stop after the last song instead of starting over
        #[arg(long)]
        no_wrap: bool,

        /// Clear register bits the receiver ignores before sending
        #[arg(long)]
        mask_registers: bool,

        /// Log YM6 timer effects as they play
        #[arg(long)]
        log_effects: bool,

        /// Index of the first song to play
        #[arg(long)]
        start: Option<usize>,
    }

    impl Args {
        /// Load the configuration file (if any) and apply command line overrides
        fn config(&self) -> anyhow::Result<PlayerConfig> {
            let mut config = match &self.config {
                Some(path) => PlayerConfig::load(path)
                    .with_context(|| format!("loading config {}", path.display()))?,
                None => PlayerConfig::default(),
            };

            if let Some(device) = &self.device {
                config.device = Some(device.clone());
            }
            if self.repeat {
                config.session.repeat_song = true;
            }
            if self.no_wrap {
                config.session.wrap_playlist = false;
            }
            if self.mask_registers {
                config.session.mask_registers = true;
            }
            if self.log_effects {
                config.session.log_effects = true;
            }
            if let Some(start) = self.start {
                config.session.start_index = start;
            }
            config.validate()?;
            Ok(config)
        }
    }

    fn open_transport(
        config: &PlayerConfig,
        dry_run: bool,
    ) -> anyhow::Result<Box<dyn Transport + Send>> {
        if dry_run {
            return Ok(Box::new(NullTransport::new()));
        }
        match &config.device {
            Some(device) => {
                let transport = WriterTransport::open(device)
                    .with_context(|| format!("opening {}", device.display()))?;
                Ok(Box::new(transport))
            }
            None => bail!("no serial device configured; pass --device <PATH> or --dry-run"),
        }
    }

    /// Set `quit` when a line is read from stdin
    fn spawn_quit_listener(quit: Arc<AtomicBool>) -> io::Result<()> {
        thread::Builder::new()
            .name("ym-serial-input".into())
            .spawn(move || {
                let mut line = String::new();
                if let Ok(n) = io::stdin().lock().read_line(&mut line) {
                    if n > 0 {
                        quit.store(true, Ordering::SeqCst);
                    }
                }
            })?;
        Ok(())
    }

    pub fn run() -> anyhow::Result<()> {
        tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
            )
            .init();

        let args = Args::parse();
        let config = args.config()?;

        let groups = group_by_song(args.files.iter().cloned());
        println!("YM serial streamer: {} song(s)", groups.len());
        for (index, group) in groups.iter().enumerate() {
            println!("  [{}] {}", index, group);
        }

        let transport = open_transport(&config, args.dry_run)?;
        tracing::info!(transport = transport.name(), "transport ready");

        let session = PlaybackSession::new(groups, transport, config.session.clone())?;

        let quit = Arc::new(AtomicBool::new(false));
        spawn_quit_listener(Arc::clone(&quit))?;
        println!("Press Enter to quit.");

        let stats = drive(session, config.timing.policy(), &quit)?;

        println!("\n=== Playback Statistics ===");
        println!("Frames:            {}", stats.frames);
        println!("Songs started:     {}", stats.songs_started);
        println!("Packets sent:      {}", stats.packets_sent);
        println!("Packets dropped:   {}", stats.packets_dropped);
        println!("Load failures:     {}", stats.load_failures);
        Ok(())
    }
}

#[cfg(feature = "cli")]
fn main() -> anyhow::Result<()> {
    cli::run()
}
