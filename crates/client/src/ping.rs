use std::collections::VecDeque;

use strafe::protocol::{MAX_PINGREQUESTS, PING_UNREACHABLE};
use strafe::{ConnectionSession, NetAddress, Transport};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PingOutcome {
    Time(u32),
    Unreachable,
    /// The slot was taken over by another ping before an answer arrived.
    Evicted,
}

/// Pings a list of servers without ever asking for more slots than the
/// session's ping pool holds.
#[derive(Debug, Default)]
pub struct PingBatch {
    waiting: VecDeque<String>,
    pending: Vec<NetAddress>,
}

impl PingBatch {
    pub fn new(servers: &[String]) -> Self {
        Self {
            waiting: servers.iter().cloned().collect(),
            pending: Vec::new(),
        }
    }

    pub fn is_done(&self) -> bool {
        self.waiting.is_empty() && self.pending.is_empty()
    }

    /// Collects finished pings and starts queued ones while slots are free.
    pub fn poll<T: Transport>(
        &mut self,
        session: &mut ConnectionSession<T>,
    ) -> Vec<(NetAddress, PingOutcome)> {
        let mut finished = Vec::new();
        for n in 0..MAX_PINGREQUESTS {
            let Some((address, time)) = session.get_ping(n) else {
                continue;
            };
            if time == 0 || !self.pending.contains(&address) {
                continue;
            }
            let outcome = if time == PING_UNREACHABLE {
                PingOutcome::Unreachable
            } else {
                PingOutcome::Time(time)
            };
            finished.push((address, outcome));
            session.discovery_mut().clear_ping(n);
            self.pending.retain(|pinged| *pinged != address);
        }

        while session.discovery().ping_queue_count() < MAX_PINGREQUESTS {
            let Some(server) = self.waiting.pop_front() else {
                break;
            };
            match session.ping(&server) {
                Ok(address) => self.pending.push(address),
                Err(err) => log::warn!("{}", err),
            }
        }

        self.pending.retain(|address| {
            let pooled = session.discovery().pings().contains(address);
            if !pooled {
                finished.push((*address, PingOutcome::Evicted));
            }
            pooled
        });
        finished
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strafe::SessionConfig;
    use strafe::net::{MemoryTransport, command_line, out_of_band};

    fn servers(count: usize) -> Vec<String> {
        (1..=count).map(|n| format!("10.0.{}.{}:27960", n / 200, n % 200 + 1)).collect()
    }

    #[test]
    fn more_servers_than_slots_all_finish() {
        let mut session = ConnectionSession::new(SessionConfig::default(), MemoryTransport::new());
        let mut batch = PingBatch::new(&servers(MAX_PINGREQUESTS + 1));
        let mut results = Vec::new();

        session.frame(0).unwrap();
        results.extend(batch.poll(&mut session));
        let requests = session.transport_mut().take_sent();
        assert_eq!(requests.len(), MAX_PINGREQUESTS);
        assert!(requests.iter().all(|(data, _)| command_line(data).starts_with("getinfo")));

        for (_, to) in &requests {
            session
                .transport_mut()
                .inject(out_of_band("infoResponse\n\\protocol\\68\\hostname\\x"), *to);
        }
        session.frame(40).unwrap();
        results.extend(batch.poll(&mut session));
        assert_eq!(results.len(), MAX_PINGREQUESTS);
        assert!(results.iter().all(|(_, outcome)| *outcome == PingOutcome::Time(40)));
        assert!(!batch.is_done());

        let last = session.transport_mut().take_sent();
        assert_eq!(last.len(), 1);

        let mut now = 40;
        while !batch.is_done() {
            now += 100;
            assert!(now < 10_000, "ping batch never finished");
            session.frame(now).unwrap();
            results.extend(batch.poll(&mut session));
        }
        assert_eq!(results.len(), MAX_PINGREQUESTS + 1);
        assert_eq!(results.last(), Some(&(last[0].1, PingOutcome::Unreachable)));
    }

    #[test]
    fn evicted_ping_is_reported() {
        let mut session = ConnectionSession::new(SessionConfig::default(), MemoryTransport::new());
        let mut batch = PingBatch::new(&servers(1));
        session.frame(0).unwrap();
        batch.poll(&mut session);

        let evicted = session.discovery().pings().slot(0).unwrap().address;
        session.discovery_mut().clear_ping(0);
        assert_eq!(batch.poll(&mut session), vec![(evicted, PingOutcome::Evicted)]);
        assert!(batch.is_done());
    }
}
