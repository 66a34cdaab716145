use std::thread;
use std::time::{Duration, Instant};

use anyhow::Result;

use strafe::net::info_pairs;
use strafe::{ConnectionSession, ServerSource, SessionEvent, UdpTransport};

const FRAME_SLEEP: Duration = Duration::from_millis(1);

#[derive(Debug, Clone, Copy)]
pub enum Limit {
    None,
    Frames(u64),
    Time(Duration),
}

/// Runs a session on the wall clock and logs what it reports.
pub struct Driver {
    pub session: ConnectionSession<UdpTransport>,
    start: Instant,
}

impl Driver {
    pub fn new(session: ConnectionSession<UdpTransport>) -> Self {
        Self {
            session,
            start: Instant::now(),
        }
    }

    pub fn now_ms(&self) -> u64 {
        self.start.elapsed().as_millis() as u64
    }

    /// Runs frames until `handle` returns true for an event or the limit is
    /// reached. Returns whether the loop stopped on an event.
    pub fn run(
        &mut self,
        limit: Limit,
        mut handle: impl FnMut(&mut ConnectionSession<UdpTransport>, &SessionEvent) -> bool,
    ) -> Result<bool> {
        let started = Instant::now();
        let mut frames = 0;
        loop {
            self.session.frame(self.now_ms())?;
            frames += 1;
            for event in self.session.poll_events() {
                log_event(&event);
                if handle(&mut self.session, &event) {
                    return Ok(true);
                }
            }
            let done = match limit {
                Limit::None => false,
                Limit::Frames(max) => frames >= max,
                Limit::Time(duration) => started.elapsed() >= duration,
            };
            if done {
                return Ok(false);
            }
            thread::sleep(FRAME_SLEEP);
        }
    }

    /// Runs frames for `duration` regardless of events.
    pub fn run_for(&mut self, duration: Duration) -> Result<()> {
        self.run(Limit::Time(duration), |_, _| false)?;
        Ok(())
    }

    pub fn log_stats(&self) {
        let stats = self.session.transport().stats();
        log::info!(
            "{} packets sent ({} bytes), {} received ({} bytes), {} dropped ({:.1}% loss)",
            stats.packets_sent,
            stats.bytes_sent,
            stats.packets_received,
            stats.bytes_received,
            stats.packets_dropped,
            stats.loss_percent()
        );
    }

    pub fn print_servers(&self, source: ServerSource) {
        let list = self.session.discovery().list(source);
        println!("{} servers", list.len());
        for entry in list.entries() {
            println!(
                "{:<24} {:>4}ms {:>2}/{:<2} {:<12} {}",
                entry.address.to_string(),
                entry.ping,
                entry.clients,
                entry.max_clients,
                entry.map_name,
                entry.host_name
            );
        }
    }
}

fn log_event(event: &SessionEvent) {
    match event {
        SessionEvent::StateChanged { from, to } => log::debug!("{} -> {}", from, to),
        SessionEvent::Connected { server } => log::info!("Connected to {}", server),
        SessionEvent::Disconnected { reason } => log::info!("{}", reason),
        SessionEvent::ServerPrint(text) => print!("{}", text),
        SessionEvent::Motd(text) => println!("MOTD: {}", text),
        SessionEvent::DemoCompleted { timedemo, .. } => {
            if let Some(summary) = timedemo {
                println!("{}", summary);
            }
        }
        SessionEvent::ServerListUpdated { source, count } => {
            log::info!("{} servers parsed ({:?} list)", count, source);
        }
        SessionEvent::ServerStatus(report) => {
            println!("Server ({})", report.address);
            for (key, value) in info_pairs(&report.info) {
                println!("{:<20} {}", key, value);
            }
            println!();
            println!("Players:");
            println!("num: score: ping: name:");
            for (num, player) in report.players.iter().enumerate() {
                println!(
                    "{:<3}  {:<5}  {:<4}  {}",
                    num, player.score, player.ping, player.name
                );
            }
        }
    }
}
