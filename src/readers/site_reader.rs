use crate::error::Result;
use crate::models::SiteLocation;
use std::collections::HashMap;
use std::path::Path;
use tracing::warn;
use validator::Validate;

/// Reader for `site_coords` files (`sitecode,lat,lon[,elev]`)
pub struct SiteReader {
    skip_invalid: bool,
}

impl SiteReader {
    pub fn new() -> Self {
        Self { skip_invalid: false }
    }

    /// Skip rows that fail coordinate validation instead of failing the read
    pub fn with_skip_invalid(skip_invalid: bool) -> Self {
        Self { skip_invalid }
    }

    pub fn read_sites(&self, path: &Path) -> Result<Vec<SiteLocation>> {
        let mut reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .comment(Some(b'#'))
            .from_path(path)?;

        let mut sites = Vec::new();
        for row in reader.deserialize::<SiteLocation>() {
            let site = row?;
            match site.validate() {
                Ok(()) => sites.push(site),
                Err(e) if self.skip_invalid => {
                    warn!(site = %site.site, error = %e, "skipping site with invalid coordinates");
                }
                Err(e) => return Err(e.into()),
            }
        }

        Ok(sites)
    }

    /// Sites keyed by their code
    pub fn read_sites_map(&self, path: &Path) -> Result<HashMap<String, SiteLocation>> {
        let sites = self.read_sites(path)?;
        Ok(sites.into_iter().map(|s| (s.site.clone(), s)).collect())
    }
}

impl Default for SiteReader {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProcessingError;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_read_sites_file() -> Result<()> {
        let mut temp_file = NamedTempFile::new()?;
        writeln!(temp_file, "sitecode,lat,lon")?;
        writeln!(temp_file, "Seg, 34.362, -106.702")?;
        writeln!(temp_file, "Ses, 34.335, -106.744")?;

        let sites = SiteReader::new().read_sites(temp_file.path())?;

        assert_eq!(sites.len(), 2);
        assert_eq!(sites[0].site, "Seg");
        assert!((sites[1].longitude - -106.744).abs() < 1e-9);
        assert_eq!(sites[0].elevation, None);
        Ok(())
    }

    #[test]
    fn test_invalid_coordinates() -> Result<()> {
        let mut temp_file = NamedTempFile::new()?;
        writeln!(temp_file, "sitecode,lat,lon")?;
        writeln!(temp_file, "Bad,134.0,-106.7")?;
        writeln!(temp_file, "Wjs,34.426,-105.862")?;

        let strict = SiteReader::new().read_sites(temp_file.path());
        assert!(matches!(strict, Err(ProcessingError::Validation(_))));

        let lenient = SiteReader::with_skip_invalid(true).read_sites_map(temp_file.path())?;
        assert_eq!(lenient.len(), 1);
        assert!(lenient.contains_key("Wjs"));
        Ok(())
    }
}
