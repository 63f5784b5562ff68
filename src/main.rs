use std::{error::Error, time::Duration};

use clap::Parser;
use handlebars::Handlebars;

use component::App;
use debug_tool::EchoGateway;
use gateway::gemini::{GeminiGateway, DEFAULT_API_BASE, DEFAULT_MODEL};
use gateway::GatewayWorker;
use geo::{GeoWorker, IpLocationSource};
use session::Session;

mod component;
mod debug_tool;
mod gateway;
mod geo;
mod session;

#[derive(Debug, clap::Parser)]
struct Args {
    /// guide settings (toml); built-in defaults are used when omitted
    #[arg(long, short)]
    config: Option<String>,

    /// talk to the offline echo gateway instead of the model API
    #[arg(long)]
    debug_ui: bool,
}

const DEFAULT_GREETING: &str = "Hello! I am your **{{assistant_name}}**. \n\nI can guide \
you about any city, market, street, or famous place in {{country}}. \n\nHow can I help you today?";

const DEFAULT_SYSTEM_TEMPLATE: &str = r#"
You are the '{{assistant_name}}'. Your goal is to provide detailed, accurate information about cities, areas, streets, markets, malls, hospitals, schools, banks, tourist spots, and historical places in {{country}}.

**Guidelines:**
1.  **Language:** Answer in a mix of friendly Urdu (Roman script) and English.
2.  **Country Name:** Always refer to the country as "{{country}}" in English.
3.  **Structure:**
    *   **Summary:** A short summary.
    *   **Details:** Bullet points with details (Address, Timing, Phone, Landmarks).
    *   **Source:** Mention source at the end (e.g., Google Maps / OpenStreetMap).
4.  **Image Analysis:** If an image is provided, identify signboards/landmarks to suggest location.
5.  **Map Data Protocol (CRITICAL):**
    If the user asks about places that should be shown on a map, provide the coordinates in a HIDDEN JSON block at the very end.
    **Support MULTIPLE locations.**
    **Categories:** Assign a category to each place: "police", "hospital", "school", "food", "bank", "park", "shop", or "default".

    Format:
    <<<LOC>>>[{"lat": 31.5204, "lng": 74.3587, "title": "Liberty Market", "category": "shop"}, {"lat": 31.48, "lng": 74.3, "title": "Jinnah Hospital", "category": "hospital"}]<<<LOC>>>

    *   Ensure coordinates are accurate for {{country}}.

6.  **Style:** Professional, helpful, respectful. Keep text clean.
"#;

#[derive(Debug, Clone, serde::Deserialize)]
#[serde(default)]
struct GuideConfig {
    country: String,
    assistant_name: String,
    greeting: String,
    model: String,
    api_base: String,
    api_key_env: String,
    geolocation_url: String,
    request_timeout_secs: u64,
    system_template: String,
}

impl Default for GuideConfig {
    fn default() -> Self {
        Self {
            country: "Pakistan".to_string(),
            assistant_name: "Pakistan World Guide AI".to_string(),
            greeting: DEFAULT_GREETING.to_string(),
            model: DEFAULT_MODEL.to_string(),
            api_base: DEFAULT_API_BASE.to_string(),
            api_key_env: "GEMINI_API_KEY".to_string(),
            geolocation_url: "http://ip-api.com/json".to_string(),
            request_timeout_secs: 60,
            system_template: DEFAULT_SYSTEM_TEMPLATE.to_string(),
        }
    }
}

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::init();
    let cli = Args::parse();

    let config: GuideConfig = match &cli.config {
        Some(path) => {
            let raw = std::fs::read_to_string(path)
                .map_err(|_| anyhow::anyhow!("config file `{}` not found", path))?;
            toml::from_str(&raw)?
        }
        None => GuideConfig::default(),
    };

    let hb = Handlebars::new();
    let persona = serde_json::json!({
        "country": config.country,
        "assistant_name": config.assistant_name,
    });
    let system_instruction = hb.render_template(&config.system_template, &persona)?;
    let greeting = hb.render_template(&config.greeting, &persona)?;

    let timeout = Duration::from_secs(config.request_timeout_secs);

    let (turn_tx, turn_rx) = crossbeam::channel::unbounded();
    let (reply_tx, reply_rx) = crossbeam::channel::unbounded();
    let (geo_req_tx, geo_req_rx) = crossbeam::channel::unbounded();
    let (geo_res_tx, geo_res_rx) = crossbeam::channel::unbounded();

    if cli.debug_ui {
        let worker = GatewayWorker::new(EchoGateway, turn_rx, reply_tx);
        std::thread::spawn(move || worker.run_loop());
    } else {
        let api_key = std::env::var(&config.api_key_env).unwrap_or_default();
        if api_key.is_empty() {
            log::warn!(
                "{} is not set, every model call will fail",
                config.api_key_env
            );
        }
        let gateway = GeminiGateway::new(
            api_key,
            config.model.clone(),
            config.api_base.clone(),
            system_instruction,
            timeout,
        )?;
        let worker = GatewayWorker::new(gateway, turn_rx, reply_tx);
        std::thread::spawn(move || worker.run_loop());
    }

    let source = IpLocationSource::new(config.geolocation_url.clone(), timeout)?;
    let geo_worker = GeoWorker::new(source, geo_req_rx, geo_res_tx);
    std::thread::spawn(move || geo_worker.run_loop());

    let app = App::new(
        config.assistant_name.clone(),
        Session::new(&greeting),
        turn_tx,
        reply_rx,
        geo_req_tx,
        geo_res_rx,
    );

    let res = app.run_loop();

    if let Err(err) = res {
        println!("{err:?}");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_renders_its_templates() {
        let config = GuideConfig::default();
        let hb = Handlebars::new();
        let persona = serde_json::json!({
            "country": config.country,
            "assistant_name": config.assistant_name,
        });

        let system = hb.render_template(&config.system_template, &persona).unwrap();
        assert!(system.contains("Pakistan"));
        assert!(system.contains("<<<LOC>>>"));
        assert!(!system.contains("{{"));

        let greeting = hb.render_template(&config.greeting, &persona).unwrap();
        assert!(greeting.contains("Pakistan World Guide AI"));
    }

    #[test]
    fn partial_config_files_fill_defaults() {
        let config: GuideConfig = toml::from_str(r#"country = "Japan""#).unwrap();
        assert_eq!(config.country, "Japan");
        assert_eq!(config.model, DEFAULT_MODEL);
        assert_eq!(config.api_key_env, "GEMINI_API_KEY");
        assert_eq!(config.request_timeout_secs, 60);
    }
}
