use std::fmt;
use std::str::FromStr;
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use anyhow::{bail, Context};
use log::{debug, warn};

pub const DEFAULT_LOCATION_TIMEOUT: Duration = Duration::from_secs(3);

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

impl GeoPoint {
    pub fn new(latitude: f64, longitude: f64) -> anyhow::Result<Self> {
        if !(-90.0..=90.0).contains(&latitude) {
            bail!("latitude {latitude} out of range");
        }
        if !(-180.0..=180.0).contains(&longitude) {
            bail!("longitude {longitude} out of range");
        }
        Ok(Self {
            latitude,
            longitude,
        })
    }
}

impl FromStr for GeoPoint {
    type Err = anyhow::Error;

    /// Parses `"lat,lon"`.
    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let Some((lat, lon)) = raw.split_once(',') else {
            bail!("expected \"lat,lon\", got {raw:?}");
        };
        let latitude = lat
            .trim()
            .parse::<f64>()
            .with_context(|| format!("invalid latitude {lat:?}"))?;
        let longitude = lon
            .trim()
            .parse::<f64>()
            .with_context(|| format!("invalid longitude {lon:?}"))?;
        GeoPoint::new(latitude, longitude)
    }
}

impl fmt::Display for GeoPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Latitude: {}, Longitude: {}",
            self.latitude, self.longitude
        )
    }
}

/// Something that can tell where the device is. May be slow or never answer.
pub trait LocationSource: Send + 'static {
    fn locate(&self) -> Option<GeoPoint>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct FixedLocation(pub Option<GeoPoint>);

impl LocationSource for FixedLocation {
    fn locate(&self) -> Option<GeoPoint> {
        self.0
    }
}

/// Asks `source` once and waits at most `timeout`. Late answers are dropped.
pub fn resolve_location<S: LocationSource>(source: S, timeout: Duration) -> Option<GeoPoint> {
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        let _ = tx.send(source.locate());
    });
    match rx.recv_timeout(timeout) {
        Ok(Some(point)) => {
            debug!("location resolved: {point}");
            Some(point)
        }
        Ok(None) => {
            debug!("location unavailable");
            None
        }
        Err(_) => {
            warn!("location lookup gave no answer within {timeout:?}; continuing without it");
            None
        }
    }
}
