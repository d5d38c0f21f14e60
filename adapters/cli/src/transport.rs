//! In-process transport that delivers invocations between participants.

use std::collections::{BTreeMap, VecDeque};

use duel_defence_core::{Invocation, ParticipantId, Transport};
use log::trace;

/// Ordered, lossless loopback channel.
///
/// Every invocation crosses the channel as `bincode` bytes, so anything that
/// does not survive serialization fails here instead of in a real network
/// adapter.
#[derive(Debug)]
pub(crate) struct LoopbackTransport {
    master: ParticipantId,
    inboxes: BTreeMap<ParticipantId, VecDeque<Vec<u8>>>,
    delivered_bytes: u64,
}

impl LoopbackTransport {
    /// Creates a channel connecting `participants`, coordinated by `master`.
    pub(crate) fn new(master: ParticipantId, participants: &[ParticipantId]) -> Self {
        Self {
            master,
            inboxes: participants
                .iter()
                .map(|participant| (*participant, VecDeque::new()))
                .collect(),
            delivered_bytes: 0,
        }
    }

    /// Total bytes handed to recipients so far.
    #[must_use]
    pub(crate) const fn delivered_bytes(&self) -> u64 {
        self.delivered_bytes
    }

    /// Drains every invocation queued for `participant`, in send order.
    pub(crate) fn receive(
        &mut self,
        participant: ParticipantId,
    ) -> Result<Vec<Invocation>, bincode::Error> {
        let Some(inbox) = self.inboxes.get_mut(&participant) else {
            return Ok(Vec::new());
        };
        inbox
            .drain(..)
            .map(|bytes| bincode::deserialize(&bytes))
            .collect()
    }
}

impl Transport for LoopbackTransport {
    type Error = bincode::Error;

    fn invoke(&mut self, invocation: &Invocation) -> Result<(), Self::Error> {
        let bytes = bincode::serialize(invocation)?;
        for (participant, inbox) in &mut self.inboxes {
            if invocation
                .scope
                .includes(invocation.sender, *participant, self.master)
            {
                trace!(
                    "queueing {} for {participant:?}",
                    invocation.procedure.name()
                );
                self.delivered_bytes = self.delivered_bytes.saturating_add(bytes.len() as u64);
                inbox.push_back(bytes.clone());
            }
        }
        Ok(())
    }

    fn master(&self) -> ParticipantId {
        self.master
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use duel_defence_core::{Procedure, TargetScope};

    const HOST: ParticipantId = ParticipantId::new(1);
    const GUEST: ParticipantId = ParticipantId::new(2);

    fn start_wave(sender: ParticipantId, scope: TargetScope, index: usize) -> Invocation {
        Invocation::new(sender, scope, Procedure::StartWave { index })
    }

    #[test]
    fn scopes_select_recipients() {
        let mut transport = LoopbackTransport::new(HOST, &[HOST, GUEST]);
        transport
            .invoke(&start_wave(GUEST, TargetScope::All, 0))
            .expect("invoke");
        transport
            .invoke(&start_wave(GUEST, TargetScope::Others, 1))
            .expect("invoke");
        transport
            .invoke(&start_wave(GUEST, TargetScope::MasterOnly, 2))
            .expect("invoke");

        let host = transport.receive(HOST).expect("decode");
        let guest = transport.receive(GUEST).expect("decode");

        assert_eq!(
            host,
            vec![
                start_wave(GUEST, TargetScope::All, 0),
                start_wave(GUEST, TargetScope::Others, 1),
                start_wave(GUEST, TargetScope::MasterOnly, 2),
            ]
        );
        assert_eq!(guest, vec![start_wave(GUEST, TargetScope::All, 0)]);
        assert_eq!(transport.master(), HOST);
    }

    #[test]
    fn receiving_drains_the_inbox() {
        let mut transport = LoopbackTransport::new(HOST, &[HOST, GUEST]);
        transport
            .invoke(&start_wave(HOST, TargetScope::Others, 0))
            .expect("invoke");

        assert_eq!(transport.receive(GUEST).expect("decode").len(), 1);
        assert!(transport.receive(GUEST).expect("decode").is_empty());
        assert!(transport.delivered_bytes() > 0);
    }
}
