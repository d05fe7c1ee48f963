//! GeoIP database loading.
//!
//! The persistence worker needs two MaxMind databases: City and ASN. They
//! are located inside a data directory by case-insensitive name substring
//! (`city` / `asn`), matching how GeoLite2 downloads are typically unpacked.
//! Both are required at startup; lookups happen in the enricher.

use std::path::{Path, PathBuf};

use maxminddb::Reader;

use crate::error_handling::InitializationError;

/// Opened GeoIP database readers, shared read-only across lookups.
pub struct GeoIpReaders {
    pub city: Option<Reader<Vec<u8>>>,
    pub asn: Option<Reader<Vec<u8>>>,
}

impl GeoIpReaders {
    /// Readers without any databases; lookups all miss. Intended for tests
    /// and for running the enrichment path without GeoIP data.
    pub fn empty() -> Self {
        GeoIpReaders {
            city: None,
            asn: None,
        }
    }

    /// Opens the City and ASN databases from `data_dir`. Both are required.
    pub fn open_dir(data_dir: &Path) -> Result<Self, InitializationError> {
        let (city_path, asn_path) = find_database_files(data_dir)?;

        let city = Reader::open_readfile(&city_path).map_err(|e| {
            InitializationError::GeoIpError(format!(
                "failed to open city database {}: {e}",
                city_path.display()
            ))
        })?;
        let asn = Reader::open_readfile(&asn_path).map_err(|e| {
            InitializationError::GeoIpError(format!(
                "failed to open asn database {}: {e}",
                asn_path.display()
            ))
        })?;

        log::info!(
            "Loaded GeoIP databases: city={} asn={}",
            city_path.display(),
            asn_path.display()
        );
        Ok(GeoIpReaders {
            city: Some(city),
            asn: Some(asn),
        })
    }
}

/// Scans `data_dir` for the first file whose lowercased name contains
/// `city` and the first containing `asn`. Directory entries are visited in
/// name order so the choice is deterministic.
pub(crate) fn find_database_files(
    data_dir: &Path,
) -> Result<(PathBuf, PathBuf), InitializationError> {
    let entries = std::fs::read_dir(data_dir).map_err(|e| {
        InitializationError::GeoIpError(format!(
            "failed to read data directory {}: {e}",
            data_dir.display()
        ))
    })?;

    let mut names: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().map(|t| t.is_file()).unwrap_or(false))
        .map(|entry| entry.path())
        .collect();
    names.sort();

    let mut city_path = None;
    let mut asn_path = None;
    for path in names {
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        let lower = name.to_lowercase();
        if city_path.is_none() && lower.contains("city") {
            city_path = Some(path.clone());
        }
        if asn_path.is_none() && lower.contains("asn") {
            asn_path = Some(path);
        }
    }

    match (city_path, asn_path) {
        (Some(city), Some(asn)) => Ok((city, asn)),
        (None, _) => Err(InitializationError::GeoIpError(format!(
            "city database not found in {}",
            data_dir.display()
        ))),
        (_, None) => Err(InitializationError::GeoIpError(format!(
            "asn database not found in {}",
            data_dir.display()
        ))),
    }
}
