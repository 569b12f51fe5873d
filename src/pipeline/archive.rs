//! Archive builder: bundle every redacted PDF of a batch into one
//! gzip-compressed tar stream.
//!
//! Entry names come from caller-supplied filenames and are untrusted: they are
//! reduced to a bare file name made of a conservative character set, always
//! ending in `.pdf`, before they reach the tar header.

use crate::config::CollisionPolicy;
use crate::error::RedactError;
use flate2::write::GzEncoder;
use flate2::Compression;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;
use tar::{Builder, EntryType, Header};
use tracing::{debug, warn};

/// MIME type of the archive produced by [`build_archive`].
pub const ARCHIVE_CONTENT_TYPE: &str = "application/gzip";

/// Download name suggested to HTTP clients.
pub const ARCHIVE_FILENAME: &str = "redacted.tar.gz";

const FALLBACK_STEM: &str = "document";
const MAX_STEM_CHARS: usize = 150;

static RE_UNSAFE_CHARS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^A-Za-z0-9._() \-]").unwrap());

/// One redacted document ready for bundling.
#[derive(Debug, Clone)]
pub struct RedactedDocument {
    /// Caller-supplied display name (unsanitised).
    pub filename: String,
    pub pdf: Vec<u8>,
}

/// The finished archive and the entry names it contains, in order.
#[derive(Debug, Clone)]
pub struct ArchiveResult {
    pub bytes: Vec<u8>,
    pub entries: Vec<String>,
}

/// Reduce an untrusted filename to a safe archive entry name.
///
/// Directory components (either separator) are dropped, characters outside
/// `[A-Za-z0-9._() -]` become `_`, leading dots are removed and the result
/// always ends in `.pdf`.
pub fn sanitize_filename(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or("");
    let cleaned = RE_UNSAFE_CHARS.replace_all(base.trim(), "_");
    let cleaned = cleaned.trim();

    // Regex output is ASCII, so byte slicing stays on a char boundary.
    let stem = if cleaned.to_ascii_lowercase().ends_with(".pdf") {
        &cleaned[..cleaned.len() - 4]
    } else {
        cleaned
    };
    let stem = stem.trim_start_matches('.').trim_end_matches(['.', ' ']).trim();
    let stem: String = stem.chars().take(MAX_STEM_CHARS).collect();

    if stem.is_empty() {
        format!("{FALLBACK_STEM}.pdf")
    } else {
        format!("{stem}.pdf")
    }
}

/// Turn `name.pdf` into `name (n).pdf`.
fn with_suffix(name: &str, n: usize) -> String {
    let stem = name.strip_suffix(".pdf").unwrap_or(name);
    format!("{stem} ({n}).pdf")
}

/// Resolve final entry names under `policy`.
///
/// Returns `(entry name, index into docs)` in archive order.
fn plan_entries(docs: &[RedactedDocument], policy: CollisionPolicy) -> Vec<(String, usize)> {
    let mut plan: Vec<(String, usize)> = Vec::with_capacity(docs.len());
    let mut slot_of: HashMap<String, usize> = HashMap::new();

    for (i, doc) in docs.iter().enumerate() {
        let name = sanitize_filename(&doc.filename);
        match (slot_of.get(&name).copied(), policy) {
            (None, _) => {
                slot_of.insert(name.clone(), plan.len());
                plan.push((name, i));
            }
            (Some(slot), CollisionPolicy::Overwrite) => {
                warn!("Archive entry '{}' overwritten by a later document", name);
                plan[slot].1 = i;
            }
            (Some(_), CollisionPolicy::Suffix) => {
                let mut n = 2;
                let mut candidate = with_suffix(&name, n);
                while slot_of.contains_key(&candidate) {
                    n += 1;
                    candidate = with_suffix(&name, n);
                }
                debug!("Archive entry '{}' renamed to '{}'", name, candidate);
                slot_of.insert(candidate.clone(), plan.len());
                plan.push((candidate, i));
            }
        }
    }
    plan
}

/// Bundle `docs` into a `.tar.gz`. Fails with [`RedactError::ArchiveEmpty`]
/// when `docs` is empty.
pub fn build_archive(
    docs: &[RedactedDocument],
    policy: CollisionPolicy,
) -> Result<ArchiveResult, RedactError> {
    if docs.is_empty() {
        return Err(RedactError::ArchiveEmpty {
            failures: Vec::new(),
        });
    }

    let plan = plan_entries(docs, policy);
    let mtime = chrono::Utc::now().timestamp().max(0) as u64;

    let gz = GzEncoder::new(Vec::new(), Compression::default());
    let mut builder = Builder::new(gz);

    for (name, i) in &plan {
        let pdf = &docs[*i].pdf;
        let mut header = Header::new_gnu();
        header.set_entry_type(EntryType::Regular);
        header.set_size(pdf.len() as u64);
        header.set_mode(0o644);
        header.set_mtime(mtime);
        builder
            .append_data(&mut header, name, pdf.as_slice())
            .map_err(RedactError::Archive)?;
    }

    let bytes = builder
        .into_inner()
        .and_then(|gz| gz.finish())
        .map_err(RedactError::Archive)?;

    debug!("Archive built: {} entries, {} bytes", plan.len(), bytes.len());
    Ok(ArchiveResult {
        bytes,
        entries: plan.into_iter().map(|(name, _)| name).collect(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::read::GzDecoder;
    use std::io::Read;

    fn doc(name: &str, body: &[u8]) -> RedactedDocument {
        RedactedDocument {
            filename: name.to_string(),
            pdf: body.to_vec(),
        }
    }

    fn read_entries(bytes: &[u8]) -> Vec<(String, Vec<u8>)> {
        let mut archive = tar::Archive::new(GzDecoder::new(bytes));
        archive
            .entries()
            .unwrap()
            .map(|e| {
                let mut e = e.unwrap();
                let name = e.path().unwrap().to_string_lossy().into_owned();
                let mut body = Vec::new();
                e.read_to_end(&mut body).unwrap();
                (name, body)
            })
            .collect()
    }

    #[test]
    fn sanitize_strips_paths_and_forces_pdf() {
        assert_eq!(sanitize_filename("../../etc/passwd"), "passwd.pdf");
        assert_eq!(sanitize_filename(r"C:\Users\me\Contract.PDF"), "Contract.pdf");
        assert_eq!(sanitize_filename("report.pdf"), "report.pdf");
        assert_eq!(sanitize_filename("scan"), "scan.pdf");
    }

    #[test]
    fn sanitize_replaces_unsafe_characters() {
        assert_eq!(sanitize_filename("a:b*c?.pdf"), "a_b_c_.pdf");
        assert_eq!(sanitize_filename(".hidden.pdf"), "hidden.pdf");
        assert_eq!(sanitize_filename("Vertrag Müller.pdf"), "Vertrag M_ller.pdf");
    }

    #[test]
    fn sanitize_falls_back_for_empty_names() {
        assert_eq!(sanitize_filename(""), "document.pdf");
        assert_eq!(sanitize_filename("..."), "document.pdf");
        assert_eq!(sanitize_filename("dir/"), "document.pdf");
        assert_eq!(sanitize_filename(".pdf"), "document.pdf");
    }

    #[test]
    fn archive_round_trips_entries_in_order() {
        let result = build_archive(
            &[doc("a.pdf", b"%PDF-a"), doc("b.pdf", b"%PDF-b")],
            CollisionPolicy::Suffix,
        )
        .unwrap();
        assert_eq!(result.entries, vec!["a.pdf", "b.pdf"]);
        let entries = read_entries(&result.bytes);
        assert_eq!(entries[0], ("a.pdf".to_string(), b"%PDF-a".to_vec()));
        assert_eq!(entries[1], ("b.pdf".to_string(), b"%PDF-b".to_vec()));
    }

    #[test]
    fn suffix_policy_keeps_every_document() {
        let result = build_archive(
            &[
                doc("x.pdf", b"1"),
                doc("x (2).pdf", b"2"),
                doc("dir/x.pdf", b"3"),
            ],
            CollisionPolicy::Suffix,
        )
        .unwrap();
        assert_eq!(result.entries, vec!["x.pdf", "x (2).pdf", "x (3).pdf"]);
        assert_eq!(read_entries(&result.bytes).len(), 3);
    }

    #[test]
    fn overwrite_policy_keeps_last_document() {
        let result = build_archive(
            &[doc("x.pdf", b"first"), doc("x.pdf", b"second")],
            CollisionPolicy::Overwrite,
        )
        .unwrap();
        assert_eq!(result.entries, vec!["x.pdf"]);
        let entries = read_entries(&result.bytes);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].1, b"second");
    }

    #[test]
    fn empty_batch_is_archive_empty() {
        let err = build_archive(&[], CollisionPolicy::Suffix).unwrap_err();
        assert!(matches!(err, RedactError::ArchiveEmpty { .. }));
    }
}
