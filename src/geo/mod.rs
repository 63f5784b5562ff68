use std::time::Duration;

use crossbeam::channel::{Receiver, Sender};
use reqwest::blocking::Client;
use serde::Deserialize;

use crate::session::Coordinates;

#[derive(Debug, thiserror::Error)]
pub enum GeoError {
    #[error("lookup failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("position unavailable")]
    Unavailable,
}

/// Single-shot device-position lookup; yields a fix or an error, nothing
/// in between.
pub trait LocationSource {
    fn current_location(&self) -> Result<Coordinates, GeoError>;
}

/// Approximates the device position from an IP-geolocation endpoint
/// (ip-api.com response shape).
pub struct IpLocationSource {
    client: Client,
    url: String,
}

impl IpLocationSource {
    pub fn new(url: String, timeout: Duration) -> Result<Self, GeoError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client, url })
    }
}

#[derive(Debug, Deserialize)]
struct IpLookup {
    status: Option<String>,
    lat: Option<f64>,
    lon: Option<f64>,
}

impl LocationSource for IpLocationSource {
    fn current_location(&self) -> Result<Coordinates, GeoError> {
        let lookup: IpLookup = self
            .client
            .get(&self.url)
            .send()?
            .error_for_status()?
            .json()?;

        if lookup.status.as_deref() == Some("fail") {
            return Err(GeoError::Unavailable);
        }
        match (lookup.lat, lookup.lon) {
            (Some(latitude), Some(longitude)) => Ok(Coordinates {
                latitude,
                longitude,
            }),
            _ => Err(GeoError::Unavailable),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct LocateRequest {
    pub generation: u64,
}

#[derive(Debug)]
pub struct LocateResult {
    pub generation: u64,
    pub outcome: Result<Coordinates, GeoError>,
}

/// Serves location fetches for the event loop. Queued requests are drained
/// down to the newest one before the lookup, so a superseded request is
/// never even fetched; the session drops stale generations that were
/// already in flight.
pub struct GeoWorker<S> {
    source: S,
    rx: Receiver<LocateRequest>,
    tx: Sender<LocateResult>,
}

impl<S: LocationSource> GeoWorker<S> {
    pub fn new(source: S, rx: Receiver<LocateRequest>, tx: Sender<LocateResult>) -> Self {
        GeoWorker { source, rx, tx }
    }

    pub fn run_loop(self) -> anyhow::Result<()> {
        loop {
            let request = self.rx.recv()?;
            let request = self.rx.try_iter().fold(request, |_, newer| newer);
            let outcome = self.source.current_location();
            self.tx.send(LocateResult {
                generation: request.generation,
                outcome,
            })?;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedSource(Coordinates);

    impl LocationSource for FixedSource {
        fn current_location(&self) -> Result<Coordinates, GeoError> {
            Ok(self.0)
        }
    }

    #[test]
    fn queued_requests_collapse_to_the_newest() {
        let (req_tx, req_rx) = crossbeam::channel::unbounded();
        let (res_tx, res_rx) = crossbeam::channel::unbounded();

        req_tx.send(LocateRequest { generation: 1 }).unwrap();
        req_tx.send(LocateRequest { generation: 2 }).unwrap();
        req_tx.send(LocateRequest { generation: 3 }).unwrap();
        drop(req_tx);

        let source = FixedSource(Coordinates {
            latitude: 33.68,
            longitude: 73.04,
        });
        // loop exits with an error once the request channel is empty
        assert!(GeoWorker::new(source, req_rx, res_tx).run_loop().is_err());

        let result = res_rx.recv().unwrap();
        assert_eq!(result.generation, 3);
        assert!(result.outcome.is_ok());
        assert!(res_rx.recv().is_err());
    }

    #[test]
    fn lookup_without_coordinates_is_unavailable() {
        let lookup: IpLookup =
            serde_json::from_str(r#"{"status":"success","lat":null,"lon":null}"#).unwrap();
        assert!(lookup.lat.is_none());

        let lookup: IpLookup = serde_json::from_str(r#"{"status":"fail"}"#).unwrap();
        assert_eq!(lookup.status.as_deref(), Some("fail"));
    }
}
