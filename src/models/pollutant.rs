//! Pollutant codes reported in the `iaqi` map of the air-quality feed.

use serde::{Deserialize, Serialize};

/// One entry of the station's individual-index map.
///
/// The declaration order is the fixed iteration order used everywhere a
/// per-pollutant loop must be deterministic (dominant pollutant tie-break,
/// CSV column order, database columns).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Pollutant {
    Co,
    Dew,
    H,
    No2,
    O3,
    P,
    Pm10,
    Pm25,
    So2,
    T,
    W,
}

impl Pollutant {
    pub const COUNT: usize = 11;

    pub const ALL: [Pollutant; Self::COUNT] = [
        Pollutant::Co,
        Pollutant::Dew,
        Pollutant::H,
        Pollutant::No2,
        Pollutant::O3,
        Pollutant::P,
        Pollutant::Pm10,
        Pollutant::Pm25,
        Pollutant::So2,
        Pollutant::T,
        Pollutant::W,
    ];

    /// Key used by the feed and by the flat record layout.
    pub fn code(&self) -> &'static str {
        match self {
            Pollutant::Co => "co",
            Pollutant::Dew => "dew",
            Pollutant::H => "h",
            Pollutant::No2 => "no2",
            Pollutant::O3 => "o3",
            Pollutant::P => "p",
            Pollutant::Pm10 => "pm10",
            Pollutant::Pm25 => "pm25",
            Pollutant::So2 => "so2",
            Pollutant::T => "t",
            Pollutant::W => "w",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|p| p.code() == code)
    }

    pub(crate) fn index(&self) -> usize {
        *self as usize
    }
}

impl std::fmt::Display for Pollutant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.code())
    }
}

/// One `f64` per pollutant, indexed by [`Pollutant`].
///
/// `NaN` marks a value the station did not report.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PollutantLevels([f64; Pollutant::COUNT]);

impl PollutantLevels {
    pub fn missing() -> Self {
        Self([f64::NAN; Pollutant::COUNT])
    }

    pub fn get(&self, pollutant: Pollutant) -> f64 {
        self.0[pollutant.index()]
    }

    pub fn set(&mut self, pollutant: Pollutant, value: f64) {
        self.0[pollutant.index()] = value;
    }

    /// Iterate in the fixed [`Pollutant::ALL`] order.
    pub fn iter(&self) -> impl Iterator<Item = (Pollutant, f64)> + '_ {
        Pollutant::ALL.iter().map(move |p| (*p, self.get(*p)))
    }
}

impl Default for PollutantLevels {
    fn default() -> Self {
        Self::missing()
    }
}

impl Serialize for PollutantLevels {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        use serde::ser::SerializeMap;

        let mut map = serializer.serialize_map(Some(Pollutant::COUNT))?;
        for (pollutant, value) in self.iter() {
            let value = if value.is_nan() { None } else { Some(value) };
            map.serialize_entry(pollutant.code(), &value)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for PollutantLevels {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw: std::collections::HashMap<String, Option<f64>> =
            std::collections::HashMap::deserialize(deserializer)?;

        let mut levels = PollutantLevels::missing();
        for (code, value) in raw {
            if let Some(pollutant) = Pollutant::from_code(&code) {
                levels.set(pollutant, value.unwrap_or(f64::NAN));
            }
        }
        Ok(levels)
    }
}
