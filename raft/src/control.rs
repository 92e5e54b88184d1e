use crate::log::LogEntry;
use crate::msg::{Message, NodeId};

/// Hook invoked with each batch of newly committed entries, in log order.
pub trait StateMachine: Send {
    fn apply(&mut self, address: NodeId, entries: &[LogEntry]);
}

/// Default state machine for a running node: prints each applied batch.
pub struct PrintingStateMachine;

impl StateMachine for PrintingStateMachine {
    fn apply(&mut self, address: NodeId, entries: &[LogEntry]) {
        println!("{address} applying {entries:?}");
    }
}

/// Per-node side-effect surface. Handlers queue outgoing messages here and
/// report committed entries through the state-machine hook; the owning
/// event loop drains the queue after every handler invocation. Nothing else
/// touches the network or the application from inside the core.
pub struct Control {
    pub address: NodeId,
    pub peers: Vec<NodeId>,
    outgoing: Vec<Message>,
    state_machine: Box<dyn StateMachine>,
}

impl Control {
    pub fn new(address: NodeId, peers: Vec<NodeId>, state_machine: Box<dyn StateMachine>) -> Self {
        Self {
            address,
            peers,
            outgoing: Vec::new(),
            state_machine,
        }
    }

    /// Peers plus this node.
    pub fn cluster_size(&self) -> usize {
        self.peers.len() + 1
    }

    pub fn send(&mut self, msg: Message) {
        self.outgoing.push(msg);
    }

    /// Messages queued since the last drain, in send order.
    pub fn drain_outgoing(&mut self) -> Vec<Message> {
        std::mem::take(&mut self.outgoing)
    }

    pub fn apply(&mut self, entries: &[LogEntry]) {
        self.state_machine.apply(self.address, entries);
    }
}
