use crossbeam::channel::{Receiver, Sender};

use crate::session::{Citation, Coordinates, ImageAttachment, Poi};

pub mod gemini;
pub mod parse;

/// Sent to the model when a turn has a photo but no words.
pub const DEFAULT_IMAGE_PROMPT: &str = "Describe this image";

/// Everything one turn hands to the model: the words, at most one photo,
/// and the current fix as an advisory bias.
#[derive(Debug, Clone)]
pub struct TurnRequest {
    pub prompt: String,
    pub image: Option<ImageAttachment>,
    pub location: Option<Coordinates>,
}

#[derive(Debug, Clone, Default)]
pub struct GuideReply {
    pub display_text: String,
    pub citations: Vec<Citation>,
    pub pois: Vec<Poi>,
}

/// The only seam the rest of the app sees; HTTP types never leave the
/// implementations. `send_turn` does not fail: transport and API errors
/// come back as an apology reply with no citations and no pins.
pub trait ModelGateway {
    fn send_turn(&self, turn: TurnRequest) -> GuideReply;
}

/// Serves gateway calls for the event loop, one blocking request at a time.
pub struct GatewayWorker<G> {
    gateway: G,
    rx: Receiver<TurnRequest>,
    tx: Sender<GuideReply>,
}

impl<G: ModelGateway> GatewayWorker<G> {
    pub fn new(gateway: G, rx: Receiver<TurnRequest>, tx: Sender<GuideReply>) -> Self {
        GatewayWorker { gateway, rx, tx }
    }

    pub fn run_loop(self) -> anyhow::Result<()> {
        loop {
            let turn = self.rx.recv()?;
            self.tx.send(self.gateway.send_turn(turn))?;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct CannedGateway;

    impl ModelGateway for CannedGateway {
        fn send_turn(&self, turn: TurnRequest) -> GuideReply {
            GuideReply {
                display_text: format!("asked: {}", turn.prompt),
                citations: Vec::new(),
                pois: Vec::new(),
            }
        }
    }

    #[test]
    fn worker_relays_one_reply_per_request() {
        let (turn_tx, turn_rx) = crossbeam::channel::unbounded();
        let (reply_tx, reply_rx) = crossbeam::channel::unbounded();
        let handle =
            std::thread::spawn(move || GatewayWorker::new(CannedGateway, turn_rx, reply_tx).run_loop());

        turn_tx
            .send(TurnRequest {
                prompt: "data darbar".to_string(),
                image: None,
                location: None,
            })
            .unwrap();
        let reply = reply_rx.recv().unwrap();
        assert_eq!(reply.display_text, "asked: data darbar");

        drop(turn_tx);
        assert!(handle.join().unwrap().is_err());
    }
}
