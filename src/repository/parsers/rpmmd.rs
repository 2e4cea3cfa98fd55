// src/repository/parsers/rpmmd.rs

//! RPM-MD repository metadata parser
//!
//! Parses repomd.xml and primary.xml files which carry RPM package metadata
//! in XML form. The fetcher hands in raw bytes; this module only parses.

use super::PackageMetadata;
use crate::error::{Error, Result};
use flate2::read::GzDecoder;
use quick_xml::Reader;
use quick_xml::events::Event;
use std::io::Read;
use tracing::debug;

/// Parse repomd.xml and return the location of the primary metadata file.
pub fn parse_repomd(xml_content: &str) -> Result<String> {
    let mut reader = Reader::from_str(xml_content);
    reader.trim_text(true);

    let mut buf = Vec::new();
    let mut in_primary = false;
    let mut location = None;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) if e.name().as_ref() == b"data" => {
                if let Some(attr) = e.attributes().find(|a| {
                    a.as_ref()
                        .map(|attr| attr.key.as_ref() == b"type")
                        .unwrap_or(false)
                }) {
                    if let Ok(attr) = attr {
                        if attr.value.as_ref() == b"primary" {
                            in_primary = true;
                        }
                    }
                }
            }
            Ok(Event::Start(e) | Event::Empty(e))
                if e.name().as_ref() == b"location" && in_primary =>
            {
                if let Some(attr) = e.attributes().find(|a| {
                    a.as_ref()
                        .map(|attr| attr.key.as_ref() == b"href")
                        .unwrap_or(false)
                }) {
                    if let Ok(attr) = attr {
                        location = Some(String::from_utf8_lossy(attr.value.as_ref()).to_string());
                    }
                }
            }
            Ok(Event::End(e)) if e.name().as_ref() == b"data" => {
                in_primary = false;
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(Error::Parse(format!("failed to parse repomd.xml: {}", e)));
            }
            _ => {}
        }
        buf.clear();
    }

    location
        .ok_or_else(|| Error::Parse("could not find primary data location in repomd.xml".to_string()))
}

/// Decompress a primary metadata payload based on its file extension.
pub fn decompress_primary(location: &str, bytes: &[u8]) -> Result<String> {
    if location.ends_with(".zst") {
        debug!("Decompressing zstd-compressed primary metadata");
        let decompressed = zstd::decode_all(bytes)
            .map_err(|e| Error::Parse(format!("failed to decompress primary.xml.zst: {}", e)))?;
        String::from_utf8(decompressed)
            .map_err(|e| Error::Parse(format!("invalid UTF-8 in primary.xml: {}", e)))
    } else if location.ends_with(".gz") {
        debug!("Decompressing gzip-compressed primary metadata");
        let mut gz = GzDecoder::new(bytes);
        let mut decompressed = String::new();
        gz.read_to_string(&mut decompressed)
            .map_err(|e| Error::Parse(format!("failed to decompress primary.xml.gz: {}", e)))?;
        Ok(decompressed)
    } else {
        String::from_utf8(bytes.to_vec())
            .map_err(|e| Error::Parse(format!("invalid UTF-8 in primary.xml: {}", e)))
    }
}

/// Parse primary.xml and extract package metadata.
pub fn parse_primary(xml_content: &str) -> Result<Vec<PackageMetadata>> {
    let mut reader = Reader::from_str(xml_content);
    reader.trim_text(true);

    let mut packages = Vec::new();
    let mut buf = Vec::new();

    let mut current_package: Option<PackageBuilder> = None;
    let mut current_tag = String::new();
    let mut in_format = false;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => {
                let tag_name = String::from_utf8_lossy(e.name().as_ref()).to_string();
                current_tag = tag_name.clone();

                match tag_name.as_str() {
                    "package" => {
                        current_package = Some(PackageBuilder::default());
                    }
                    "format" => {
                        in_format = true;
                    }
                    "checksum" => {
                        if let Some(ref mut pkg) = current_package {
                            for attr in e.attributes().filter_map(|a| a.ok()) {
                                if attr.key.as_ref() == b"type" {
                                    pkg.checksum_type =
                                        Some(String::from_utf8_lossy(&attr.value).to_string());
                                }
                            }
                        }
                    }
                    _ => {}
                }
            }
            Ok(Event::Empty(e)) => {
                let tag_name = String::from_utf8_lossy(e.name().as_ref()).to_string();

                match tag_name.as_str() {
                    "version" => {
                        if let Some(ref mut pkg) = current_package {
                            for attr in e.attributes().filter_map(|a| a.ok()) {
                                let key = String::from_utf8_lossy(attr.key.as_ref());
                                let value = String::from_utf8_lossy(&attr.value);
                                match key.as_ref() {
                                    "epoch" => pkg.epoch = Some(value.to_string()),
                                    "ver" => pkg.ver = Some(value.to_string()),
                                    "rel" => pkg.rel = Some(value.to_string()),
                                    _ => {}
                                }
                            }
                        }
                    }
                    "checksum" => {
                        if let Some(ref mut pkg) = current_package {
                            for attr in e.attributes().filter_map(|a| a.ok()) {
                                let key = String::from_utf8_lossy(attr.key.as_ref());
                                if key.as_ref() == "type" {
                                    let value = String::from_utf8_lossy(&attr.value);
                                    pkg.checksum_type = Some(value.to_string());
                                }
                            }
                        }
                    }
                    "size" => {
                        if let Some(ref mut pkg) = current_package {
                            for attr in e.attributes().filter_map(|a| a.ok()) {
                                let key = String::from_utf8_lossy(attr.key.as_ref());
                                let value = String::from_utf8_lossy(&attr.value);
                                match key.as_ref() {
                                    "package" => pkg.package_size = Some(value.to_string()),
                                    "installed" => pkg.installed_size = Some(value.to_string()),
                                    _ => {}
                                }
                            }
                        }
                    }
                    "location" => {
                        if let Some(ref mut pkg) = current_package {
                            for attr in e.attributes().filter_map(|a| a.ok()) {
                                let key = String::from_utf8_lossy(attr.key.as_ref());
                                if key.as_ref() == "href" {
                                    let value = String::from_utf8_lossy(&attr.value);
                                    pkg.location = Some(value.to_string());
                                }
                            }
                        }
                    }
                    "format" => {
                        in_format = true;
                    }
                    "entry" if in_format => {
                        // A dependency entry within <rpm:requires>
                        if let Some(ref mut pkg) = current_package {
                            let mut dep_name = None;
                            let mut dep_flags = None;
                            let mut dep_epoch = None;
                            let mut dep_ver = None;
                            let mut dep_rel = None;

                            for attr in e.attributes().filter_map(|a| a.ok()) {
                                let key = String::from_utf8_lossy(attr.key.as_ref());
                                let value = String::from_utf8_lossy(&attr.value);
                                match key.as_ref() {
                                    "name" => dep_name = Some(value.to_string()),
                                    "flags" => dep_flags = Some(value.to_string()),
                                    "epoch" => dep_epoch = Some(value.to_string()),
                                    "ver" => dep_ver = Some(value.to_string()),
                                    "rel" => dep_rel = Some(value.to_string()),
                                    _ => {}
                                }
                            }

                            if let Some(name) = dep_name {
                                // Skip rpmlib and file dependencies
                                if !name.starts_with("rpmlib(") && !name.starts_with('/') {
                                    pkg.requires.push(build_require_spec(
                                        &name, dep_flags, dep_epoch, dep_ver, dep_rel,
                                    ));
                                }
                            }
                        }
                    }
                    _ => {}
                }
            }
            Ok(Event::Text(e)) => {
                if let Some(ref mut pkg) = current_package {
                    let text = e.unescape().unwrap_or_default().to_string();
                    match current_tag.as_str() {
                        "name" => pkg.name = Some(text),
                        "arch" => pkg.arch = Some(text),
                        "summary" => pkg.summary = Some(text),
                        "checksum" => pkg.checksum = Some(text),
                        _ => {}
                    }
                }
            }
            Ok(Event::End(e)) => {
                let tag_name = String::from_utf8_lossy(e.name().as_ref()).to_string();
                if tag_name == "package" {
                    if let Some(builder) = current_package.take() {
                        packages.push(builder.build()?);
                    }
                } else if tag_name == "format" {
                    in_format = false;
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(Error::Parse(format!("failed to parse primary.xml: {}", e)));
            }
            _ => {}
        }
        buf.clear();
    }

    debug!("Parsed {} packages from primary metadata", packages.len());
    Ok(packages)
}

/// Build a `name op epoch:ver-rel` requirement spec from repodata fields.
fn build_require_spec(
    name: &str,
    flags: Option<String>,
    epoch: Option<String>,
    ver: Option<String>,
    rel: Option<String>,
) -> String {
    let op = flags.as_deref().and_then(|f| match f {
        "EQ" => Some("="),
        "LT" => Some("<"),
        "LE" => Some("<="),
        "GT" => Some(">"),
        "GE" => Some(">="),
        _ => None,
    });

    match (op, ver) {
        (Some(op), Some(ver)) => {
            let mut evr = String::new();
            if let Some(epoch) = epoch {
                if epoch != "0" {
                    evr.push_str(&epoch);
                    evr.push(':');
                }
            }
            evr.push_str(&ver);
            if let Some(rel) = rel {
                evr.push('-');
                evr.push_str(&rel);
            }
            format!("{} {} {}", name, op, evr)
        }
        _ => name.to_string(),
    }
}

/// Builder for one package entry while walking the XML events.
#[derive(Default)]
struct PackageBuilder {
    name: Option<String>,
    epoch: Option<String>,
    ver: Option<String>,
    rel: Option<String>,
    arch: Option<String>,
    summary: Option<String>,
    checksum: Option<String>,
    checksum_type: Option<String>,
    package_size: Option<String>,
    installed_size: Option<String>,
    location: Option<String>,
    requires: Vec<String>,
}

impl PackageBuilder {
    fn build(self) -> Result<PackageMetadata> {
        let name = self
            .name
            .ok_or_else(|| Error::Parse("missing package name".to_string()))?;

        let epoch = self.epoch.unwrap_or_else(|| "0".to_string());
        let ver = self
            .ver
            .ok_or_else(|| Error::Parse(format!("missing version for '{}'", name)))?;
        let rel = self
            .rel
            .ok_or_else(|| Error::Parse(format!("missing release for '{}'", name)))?;
        let version = if epoch == "0" {
            format!("{}-{}", ver, rel)
        } else {
            format!("{}:{}-{}", epoch, ver, rel)
        };

        let location = self
            .location
            .ok_or_else(|| Error::Parse(format!("missing location for '{}'", name)))?;

        let download_size = self
            .package_size
            .as_deref()
            .and_then(|s| s.parse().ok())
            .unwrap_or(0);
        let install_size = self
            .installed_size
            .as_deref()
            .and_then(|s| s.parse().ok())
            .unwrap_or(0);

        // Only SHA-256 digests participate in verification.
        let checksum = match self.checksum_type.as_deref() {
            Some("sha256") | None => self.checksum,
            Some(_) => None,
        };

        Ok(PackageMetadata {
            name,
            version,
            arch: self.arch,
            summary: self.summary,
            checksum,
            download_size,
            install_size,
            location,
            requires: self.requires,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const REPOMD: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<repomd xmlns="http://linux.duke.edu/metadata/repo">
  <data type="filelists">
    <location href="repodata/filelists.xml.gz"/>
  </data>
  <data type="primary">
    <checksum type="sha256">deadbeef</checksum>
    <location href="repodata/primary.xml.gz"/>
  </data>
</repomd>"#;

    const PRIMARY: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<metadata xmlns="http://linux.duke.edu/metadata/common" packages="2">
  <package type="rpm">
    <name>curl</name>
    <arch>x86_64</arch>
    <version epoch="0" ver="8.0.1" rel="2.fc43"/>
    <checksum type="sha256" pkgid="YES">abc123</checksum>
    <summary>Command line tool for transferring data</summary>
    <size package="350000" installed="800000" archive="810000"/>
    <location href="Packages/c/curl-8.0.1-2.fc43.x86_64.rpm"/>
    <format>
      <rpm:requires xmlns:rpm="http://linux.duke.edu/metadata/rpm">
        <rpm:entry name="libcurl" flags="GE" epoch="0" ver="8.0.1"/>
        <rpm:entry name="glibc"/>
        <rpm:entry name="rpmlib(CompressedFileNames)" flags="LE" epoch="0" ver="3.0.4" rel="1"/>
        <rpm:entry name="/bin/sh"/>
      </rpm:requires>
    </format>
  </package>
  <package type="rpm">
    <name>libcurl</name>
    <arch>x86_64</arch>
    <version epoch="1" ver="8.0.1" rel="2.fc43"/>
    <checksum type="sha512" pkgid="YES">ffff</checksum>
    <summary>A library for getting files from web servers</summary>
    <size package="280000" installed="600000"/>
    <location href="Packages/l/libcurl-8.0.1-2.fc43.x86_64.rpm"/>
  </package>
</metadata>"#;

    #[test]
    fn test_parse_repomd_finds_primary_location() {
        let location = parse_repomd(REPOMD).unwrap();
        assert_eq!(location, "repodata/primary.xml.gz");
    }

    #[test]
    fn test_parse_repomd_without_primary() {
        let xml = r#"<repomd><data type="filelists"><location href="x.gz"/></data></repomd>"#;
        assert!(matches!(parse_repomd(xml), Err(Error::Parse(_))));
    }

    #[test]
    fn test_parse_primary_extracts_packages() {
        let packages = parse_primary(PRIMARY).unwrap();
        assert_eq!(packages.len(), 2);

        let curl = &packages[0];
        assert_eq!(curl.name, "curl");
        assert_eq!(curl.version, "8.0.1-2.fc43");
        assert_eq!(curl.arch.as_deref(), Some("x86_64"));
        assert_eq!(curl.download_size, 350_000);
        assert_eq!(curl.install_size, 800_000);
        assert_eq!(curl.checksum.as_deref(), Some("abc123"));
        // rpmlib and file dependencies are skipped
        assert_eq!(
            curl.requires,
            vec!["libcurl >= 8.0.1".to_string(), "glibc".to_string()]
        );

        let libcurl = &packages[1];
        assert_eq!(libcurl.version, "1:8.0.1-2.fc43");
        // Non-SHA-256 digests do not participate in verification
        assert!(libcurl.checksum.is_none());
    }

    #[test]
    fn test_decompress_passthrough_for_plain_xml() {
        let out = decompress_primary("repodata/primary.xml", PRIMARY.as_bytes()).unwrap();
        assert!(out.contains("<name>curl</name>"));
    }

    #[test]
    fn test_decompress_gzip_round_trip() {
        use flate2::Compression;
        use flate2::write::GzEncoder;
        use std::io::Write;

        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(PRIMARY.as_bytes()).unwrap();
        let compressed = encoder.finish().unwrap();

        let out = decompress_primary("repodata/primary.xml.gz", &compressed).unwrap();
        assert_eq!(out, PRIMARY);
    }

    #[test]
    fn test_decompress_zstd_round_trip() {
        let compressed = zstd::encode_all(PRIMARY.as_bytes(), 0).unwrap();
        let out = decompress_primary("repodata/primary.xml.zst", &compressed).unwrap();
        assert_eq!(out, PRIMARY);
    }

    #[test]
    fn test_build_require_spec_epoch_handling() {
        assert_eq!(
            build_require_spec(
                "libfoo",
                Some("GE".to_string()),
                Some("2".to_string()),
                Some("1.0".to_string()),
                Some("3".to_string())
            ),
            "libfoo >= 2:1.0-3"
        );
        assert_eq!(
            build_require_spec("libbar", None, None, None, None),
            "libbar"
        );
    }
}
