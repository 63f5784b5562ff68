use crate::gateway::{parse, GuideReply, ModelGateway, TurnRequest};

/// Offline gateway for exercising the UI: echoes the prompt back with a
/// canned location block, no network and no key required.
pub struct EchoGateway;

impl ModelGateway for EchoGateway {
    fn send_turn(&self, turn: TurnRequest) -> GuideReply {
        let raw = format!(
            concat!(
                "Echo: {}\n",
                r#"<<<LOC>>>[{{"lat":31.5204,"lng":74.3587,"title":"Liberty Market","category":"shop"}},"#,
                r#"{{"lat":31.4804,"lng":74.3239,"title":"Jinnah Hospital","category":"hospital"}}]<<<LOC>>>"#,
            ),
            turn.prompt.trim()
        );
        let (display_text, pois) = parse::split_poi_block(&raw);
        GuideReply {
            display_text,
            citations: Vec::new(),
            pois,
        }
    }
}
