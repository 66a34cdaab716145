mod config;
mod driver;
mod ping;

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};

use config::Overrides;
use driver::{Driver, Limit};
use ping::{PingBatch, PingOutcome};
use strafe::{
    ConnectionSession, ConnectionState, DemoReader, DisconnectReason, PacketLossSimulation,
    ServerSource, SessionConfig, SessionEvent, UdpTransport,
};

#[derive(Parser)]
#[command(name = "strafe")]
#[command(about = "Quake 3 protocol client session")]
struct Args {
    #[arg(short, long, help = "JSON session config file")]
    config: Option<PathBuf>,

    #[arg(short, long, default_value = "0.0.0.0:0")]
    bind: String,

    #[arg(long)]
    demo_dir: Option<PathBuf>,

    #[arg(long, help = "Seconds without traffic before the connection times out")]
    timeout: Option<u64>,

    #[arg(long, default_value_t = 0.0, help = "Incoming packet loss percentage (0-100)")]
    loss: f32,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Connect to a server and stay until disconnected
    Connect {
        server: String,
        #[arg(long, help = "Record a demo once in the level")]
        record: Option<String>,
        #[arg(long, help = "Disconnect after this many frames")]
        frames: Option<u64>,
    },
    /// Play back a demo
    Play {
        demo: String,
        #[arg(long, help = "Re-record the playback under this name")]
        rerecord: Option<String>,
        #[arg(long)]
        timedemo: bool,
    },
    /// Broadcast for servers on the local network
    Local {
        #[arg(long, default_value_t = 1000)]
        wait_ms: u64,
    },
    /// Query master servers and ping what they return
    Global {
        #[arg(long, default_value_t = 0, help = "Master index, 0 for all")]
        master: usize,
        #[arg(long, help = "Master server addresses, overriding the config")]
        masters: Vec<String>,
        #[arg(long, default_value = "")]
        protocol: String,
        #[arg(long, default_value_t = 2000)]
        wait_ms: u64,
        keywords: Vec<String>,
    },
    /// Ping servers
    Ping {
        #[arg(required = true)]
        servers: Vec<String>,
    },
    /// Print the status and players of a server
    Status {
        server: String,
        #[arg(long, default_value_t = 3000)]
        wait_ms: u64,
    },
    /// Send a remote console command
    Rcon {
        #[arg(long)]
        address: Option<String>,
        #[arg(long)]
        password: Option<String>,
        #[arg(required = true)]
        command: Vec<String>,
    },
    /// Ask the update server for the message of the day
    Motd,
    /// List the records of a demo file
    Dump { file: PathBuf },
    /// Print the effective session config as JSON
    Config,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();

    let mut overrides = Overrides {
        demo_dir: args.demo_dir.clone(),
        timeout_secs: args.timeout,
        ..Overrides::default()
    };
    match &args.command {
        Command::Play { timedemo, .. } => overrides.timedemo = *timedemo,
        Command::Global { masters, .. } => overrides.masters = masters.clone(),
        Command::Rcon { address, .. } => overrides.rcon_address = address.clone(),
        _ => {}
    }
    let config = config::load(args.config.as_deref(), overrides)?;

    match &args.command {
        Command::Config => {
            println!("{}", serde_json::to_string_pretty(&config)?);
            return Ok(());
        }
        Command::Dump { file } => return dump(file),
        _ => {}
    }

    let mut driver = Driver::new(open_session(config, &args.bind, args.loss)?);

    let result = match args.command {
        Command::Connect {
            server,
            record,
            frames,
        } => connect(&mut driver, &server, record, frames),
        Command::Play {
            demo, rerecord, ..
        } => play(&mut driver, &demo, rerecord),
        Command::Local { wait_ms } => {
            driver.session.local_servers()?;
            driver.run_for(Duration::from_millis(wait_ms))?;
            refresh_pings(&mut driver, ServerSource::Local)
        }
        Command::Global {
            master,
            protocol,
            wait_ms,
            keywords,
            ..
        } => {
            driver.session.global_servers(master, &protocol, &keywords)?;
            driver.run_for(Duration::from_millis(wait_ms))?;
            refresh_pings(&mut driver, ServerSource::Global)
        }
        Command::Ping { servers } => ping(&mut driver, &servers),
        Command::Status { server, wait_ms } => {
            driver.session.request_status(&server)?;
            let answered = driver.run(Limit::Time(Duration::from_millis(wait_ms)), |_, event| {
                matches!(event, SessionEvent::ServerStatus(_))
            })?;
            if !answered {
                bail!("{} did not answer", server);
            }
            Ok(())
        }
        Command::Rcon {
            password, command, ..
        } => {
            let password =
                password.unwrap_or_else(|| driver.session.config().rcon_password.clone());
            if password.is_empty() {
                bail!("No rcon password set");
            }
            driver.session.rcon(&password, &command.join(" "))?;
            driver.run_for(Duration::from_secs(2))
        }
        Command::Motd => {
            if driver.session.config().update_server.is_none() {
                bail!("No update server configured");
            }
            driver.session.request_motd()?;
            driver.run(Limit::Time(Duration::from_secs(3)), |_, event| {
                matches!(event, SessionEvent::Motd(_))
            })?;
            Ok(())
        }
        Command::Config | Command::Dump { .. } => Ok(()),
    };
    driver.log_stats();
    result
}

fn open_session(
    config: SessionConfig,
    bind: &str,
    loss: f32,
) -> Result<ConnectionSession<UdpTransport>> {
    let mut transport = UdpTransport::bind(bind)?;
    if loss > 0.0 {
        transport.set_loss_simulation(PacketLossSimulation::with_loss(loss));
    }
    log::info!("Bound to {}", transport.local_addr());
    Ok(ConnectionSession::new(config, transport))
}

fn connect(
    driver: &mut Driver,
    server: &str,
    record: Option<String>,
    frames: Option<u64>,
) -> Result<()> {
    driver.session.connect(server)?;

    let limit = frames.map_or(Limit::None, Limit::Frames);
    let mut record = record;
    driver.run(limit, |session, event| {
        if let SessionEvent::StateChanged {
            to: ConnectionState::Active,
            ..
        } = event
        {
            if let Some(name) = record.take() {
                match session.record(Some(&name)) {
                    Ok(base) => log::info!("Recording to {}", base.display()),
                    Err(err) => log::warn!("Couldn't record: {}", err),
                }
            }
        }
        matches!(event, SessionEvent::Disconnected { .. })
    })?;

    driver.session.disconnect();
    Ok(())
}

fn play(driver: &mut Driver, demo: &str, rerecord: Option<String>) -> Result<()> {
    driver.session.play_demo(demo)?;

    let mut rerecord = rerecord;
    driver.run(Limit::None, |session, event| {
        if let SessionEvent::StateChanged {
            to: ConnectionState::Active,
            ..
        } = event
        {
            if let Some(name) = rerecord.take() {
                if let Err(err) = session.record(Some(&name)) {
                    log::warn!("Couldn't re-record: {}", err);
                }
            }
        }
        if let SessionEvent::DemoCompleted {
            next_demo: Some(next),
            ..
        } = event
        {
            log::info!("Next demo command: {}", next);
        }
        matches!(
            event,
            SessionEvent::DemoCompleted { .. }
                | SessionEvent::Disconnected {
                    reason: DisconnectReason::Dropped(_)
                }
        )
    })?;
    Ok(())
}

fn refresh_pings(driver: &mut Driver, source: ServerSource) -> Result<()> {
    driver.session.refresh_pings(source);
    while driver.session.is_refreshing_pings() {
        driver.run_for(Duration::from_millis(50))?;
    }
    driver.print_servers(source);
    Ok(())
}

fn ping(driver: &mut Driver, servers: &[String]) -> Result<()> {
    let mut batch = PingBatch::new(servers);
    while !batch.is_done() {
        driver.run_for(Duration::from_millis(10))?;
        for (address, outcome) in batch.poll(&mut driver.session) {
            match outcome {
                PingOutcome::Time(time) => println!("{}: {}ms", address, time),
                PingOutcome::Unreachable => println!("{}: unreachable", address),
                PingOutcome::Evicted => println!("{}: evicted", address),
            }
        }
    }
    Ok(())
}

fn dump(path: &Path) -> Result<()> {
    let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
    let mut reader = DemoReader::new(BufReader::new(file));
    let mut records = 0;
    while let Some(record) = reader.next_record()? {
        println!("{:>6}  seq {:>6}  {} bytes", records, record.sequence, record.payload.len());
        records += 1;
    }
    println!("{} records", records);
    Ok(())
}
