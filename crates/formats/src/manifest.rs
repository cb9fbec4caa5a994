use serde::Deserialize;

/// Per-country, per-subdivision-type listing of region geometry files.
///
/// Served as either a bare JSON array of region codes or an object with a
/// `regions` array.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegionManifest {
    pub regions: Vec<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ManifestWire {
    List(Vec<String>),
    Object { regions: Vec<String> },
}

#[derive(Debug)]
pub struct ManifestError(pub String);

impl std::fmt::Display for ManifestError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "invalid region manifest: {}", self.0)
    }
}

impl std::error::Error for ManifestError {}

impl RegionManifest {
    pub fn from_json_slice(payload: &[u8]) -> Result<Self, ManifestError> {
        let wire: ManifestWire =
            serde_json::from_slice(payload).map_err(|e| ManifestError(e.to_string()))?;
        let raw = match wire {
            ManifestWire::List(regions) => regions,
            ManifestWire::Object { regions } => regions,
        };

        // Blank entries cannot name a file; duplicates would double-fetch.
        let mut regions: Vec<String> = Vec::with_capacity(raw.len());
        for r in raw {
            let r = r.trim().to_string();
            if !r.is_empty() && !regions.contains(&r) {
                regions.push(r);
            }
        }
        Ok(Self { regions })
    }

    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }
}
