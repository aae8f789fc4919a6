// Query Orchestrator, Map Worker, and Rendezvous Store (spec.md S4.D-F).

pub mod bus;
pub mod orchestrator;
pub mod rendezvous;
pub mod worker;

pub use bus::{fan_out, WorkItem};
pub use orchestrator::{answer, answer_with_trace, AnswerTrace};
pub use rendezvous::{InMemoryRendezvousStore, PartialAnswer, RendezvousStore, SharedRendezvousStore};
pub use worker::score_community;
