use rayon::prelude::*;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use zip::ZipArchive;

use crate::error::Result;
use crate::parser::{detect_kind, NrmlKind};

/// ZIP から取り出した XML 文書
#[derive(Debug, Clone)]
pub struct XmlEntry {
    pub name: String,
    pub content: Vec<u8>,
}

impl XmlEntry {
    /// 出力パスに使う相対パス。アーカイブ内のディレクトリを残し、拡張子だけを除く
    pub fn relative_stem(&self) -> PathBuf {
        Path::new(&self.name).with_extension("")
    }
}

/// NRML 文書を束ねた ZIP アーカイブ
pub struct NrmlArchive {
    path: PathBuf,
}

impl NrmlArchive {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    /// `.xml` のエントリをすべて読み出す
    pub fn xml_entries(&self) -> Result<Vec<XmlEntry>> {
        let file = File::open(&self.path)?;
        let mut archive = ZipArchive::new(file)?;

        let mut entries = Vec::new();
        for i in 0..archive.len() {
            let mut file = archive.by_index(i)?;
            let name = file.name().to_string();

            // macOS の圧縮で付くメタデータは除外
            if file.is_dir() || !name.ends_with(".xml") || name.starts_with("__MACOSX") {
                continue;
            }
            // 出力先がアーカイブの外に出るエントリ名は扱わない
            if file.enclosed_name().is_none() {
                warn!("Skipping unsafe entry name: {}", name);
                continue;
            }

            let mut content = Vec::new();
            file.read_to_end(&mut content)?;
            debug!("Read {} ({} bytes)", name, content.len());
            entries.push(XmlEntry { name, content });
        }

        info!(
            "Found {} XML entries in {}",
            entries.len(),
            self.path.display()
        );
        Ok(entries)
    }

    /// 各エントリの文書の種類を並列に判定する
    pub fn classified_entries(&self) -> Result<Vec<(XmlEntry, Option<NrmlKind>)>> {
        self.xml_entries()?
            .into_par_iter()
            .map(|entry| {
                let kind = detect_kind(entry.content.as_slice())?;
                Ok((entry, kind))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;
    use zip::write::SimpleFileOptions;
    use zip::ZipWriter;

    fn create_archive(dir: &Path) -> PathBuf {
        let path = dir.join("results.zip");
        let mut zip = ZipWriter::new(File::create(&path).unwrap());
        let options = SimpleFileOptions::default();

        zip.add_directory("maps/", options).unwrap();
        zip.start_file("maps/hazard_map.xml", options).unwrap();
        zip.write_all(b"<nrml><hazardMap><HMNode/></hazardMap></nrml>").unwrap();
        zip.start_file("readme.txt", options).unwrap();
        zip.write_all(b"not xml").unwrap();
        zip.start_file("__MACOSX/maps/._hazard_map.xml", options).unwrap();
        zip.write_all(b"junk").unwrap();
        zip.start_file("other.xml", options).unwrap();
        zip.write_all(b"<root/>").unwrap();
        zip.finish().unwrap();

        path
    }

    #[test]
    fn test_xml_entries() {
        let temp_dir = TempDir::new().unwrap();
        let archive = NrmlArchive::new(create_archive(temp_dir.path()));

        let entries = archive.xml_entries().unwrap();
        let names: Vec<&str> = entries.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["maps/hazard_map.xml", "other.xml"]);
        assert_eq!(entries[0].relative_stem(), PathBuf::from("maps/hazard_map"));
    }

    #[test]
    fn test_relative_stem_keeps_directories() {
        let entry = |name: &str| XmlEntry {
            name: name.to_string(),
            content: Vec::new(),
        };
        assert_ne!(
            entry("run1/hazard_map.xml").relative_stem(),
            entry("run2/hazard_map.xml").relative_stem()
        );
        assert_eq!(
            entry("run1/hazard_map.xml").relative_stem(),
            PathBuf::from("run1/hazard_map")
        );
        assert_eq!(entry("map.v2.xml").relative_stem(), PathBuf::from("map.v2"));
    }

    #[test]
    fn test_classified_entries() {
        let temp_dir = TempDir::new().unwrap();
        let archive = NrmlArchive::new(create_archive(temp_dir.path()));

        let classified = archive.classified_entries().unwrap();
        assert_eq!(classified[0].1, Some(NrmlKind::HazardMap));
        assert_eq!(classified[1].1, None);
    }

    #[test]
    fn test_missing_archive() {
        let archive = NrmlArchive::new("/nonexistent/results.zip");
        assert!(archive.xml_entries().is_err());
    }
}
