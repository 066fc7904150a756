use std::collections::BTreeMap;
use std::io::{self, Cursor, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use flate2::Compression;
use flate2::write::GzEncoder;
use proptest::prelude::*;
use tar::{EntryType, Header};
use tempfile::tempdir;
use unfurl_archive::{Error, ErrorKind, ExtractEvent, ExtractOptions, Extractor};

enum Item<'a> {
    Dir(&'a str),
    File(&'a str, &'a [u8], u32),
    Link(&'a str, &'a str),
    /// Header written byte-for-byte so paths the builder refuses can be encoded.
    RawFile(&'a [u8], &'a [u8]),
}

fn gzip(raw: &[u8]) -> Vec<u8> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(raw).unwrap();
    encoder.finish().unwrap()
}

fn tar_gz(items: &[Item<'_>]) -> Vec<u8> {
    let mut builder = tar::Builder::new(GzEncoder::new(Vec::new(), Compression::default()));
    for item in items {
        let mut header = Header::new_gnu();
        match item {
            Item::Dir(path) => {
                header.set_entry_type(EntryType::Directory);
                header.set_path(path).unwrap();
                header.set_mode(0o755);
                header.set_size(0);
                header.set_cksum();
                builder.append(&header, io::empty()).unwrap();
            }
            Item::File(path, data, mode) => {
                header.set_entry_type(EntryType::Regular);
                header.set_path(path).unwrap();
                header.set_mode(*mode);
                header.set_size(data.len() as u64);
                header.set_cksum();
                builder.append(&header, *data).unwrap();
            }
            Item::Link(path, target) => {
                header.set_entry_type(EntryType::Symlink);
                header.set_path(path).unwrap();
                header.set_link_name(target).unwrap();
                header.set_mode(0o777);
                header.set_size(0);
                header.set_cksum();
                builder.append(&header, io::empty()).unwrap();
            }
            Item::RawFile(name, data) => {
                header.set_entry_type(EntryType::Regular);
                header.as_old_mut().name[..name.len()].copy_from_slice(name);
                header.set_mode(0o644);
                header.set_size(data.len() as u64);
                header.set_cksum();
                builder.append(&header, *data).unwrap();
            }
        }
    }
    builder.into_inner().unwrap().finish().unwrap()
}

/// Every regular file under `root`, keyed by its path relative to `root`.
fn files_under(root: &Path) -> BTreeMap<PathBuf, Vec<u8>> {
    fn walk(root: &Path, dir: &Path, out: &mut BTreeMap<PathBuf, Vec<u8>>) {
        for entry in std::fs::read_dir(dir).unwrap() {
            let path = entry.unwrap().path();
            if path.is_dir() {
                walk(root, &path, out);
            } else {
                let rel = path.strip_prefix(root).unwrap().to_path_buf();
                out.insert(rel, std::fs::read(&path).unwrap());
            }
        }
    }
    let mut out = BTreeMap::new();
    walk(root, root, &mut out);
    out
}

fn recorder() -> (ExtractOptions, Arc<Mutex<Vec<ExtractEvent>>>) {
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&events);
    let options = ExtractOptions::default().on_event(Arc::new(move |event: &ExtractEvent| {
        sink.lock().unwrap().push(event.clone());
    }));
    (options, events)
}

/// Yields `data` up to `fail_at` bytes, then fails like a dropped connection.
struct FailingSource {
    data: Cursor<Vec<u8>>,
    fail_at: u64,
}

impl Read for FailingSource {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let left = self.fail_at.saturating_sub(self.data.position());
        if left == 0 {
            return Err(io::Error::new(io::ErrorKind::ConnectionReset, "connection reset"));
        }
        let n = buf.len().min(left as usize);
        self.data.read(&mut buf[..n])
    }
}

fn release_archive() -> Vec<u8> {
    tar_gz(&[
        Item::Dir("tool-1.2/"),
        Item::Dir("tool-1.2/bin/"),
        Item::File("tool-1.2/bin/tool", b"#!/bin/sh\necho tool\n", 0o755),
        Item::File("tool-1.2/README.md", b"# tool\n", 0o644),
        Item::File("tool-1.2/share/nested/data.bin", &[0u8, 1, 2, 3, 255], 0o600),
    ])
}

#[test]
fn test_extract_with_strip_components() {
    let dir = tempdir().unwrap();
    let dest = dir.path().join("out");
    let (options, events) = recorder();

    let report = Extractor::new(&dest, options.strip_components(1))
        .extract(Cursor::new(release_archive()))
        .unwrap();

    assert_eq!(report.files(), 3);
    assert_eq!(report.total_bytes, 20 + 7 + 5);
    assert_eq!(
        files_under(&dest),
        BTreeMap::from([
            (PathBuf::from("README.md"), b"# tool\n".to_vec()),
            (PathBuf::from("bin/tool"), b"#!/bin/sh\necho tool\n".to_vec()),
            (PathBuf::from("share/nested/data.bin"), vec![0u8, 1, 2, 3, 255]),
        ])
    );

    let events = events.lock().unwrap();
    let written: Vec<_> = events
        .iter()
        .map(|event| match event {
            ExtractEvent::FileWritten { path, bytes } => {
                assert!(path.is_absolute());
                (path.file_name().unwrap().to_owned(), *bytes)
            }
            other => panic!("unexpected event {other:?}"),
        })
        .collect();
    assert_eq!(written.len(), 3);
    assert_eq!(written[0], ("tool".into(), 20));
}

#[test]
fn test_extract_without_strip_keeps_top_directory() {
    let dir = tempdir().unwrap();
    let dest = dir.path().join("out");

    Extractor::new(&dest, ExtractOptions::default())
        .extract(Cursor::new(release_archive()))
        .unwrap();

    assert!(dest.join("tool-1.2/bin/tool").is_file());
}

#[test]
#[cfg(unix)]
fn test_file_modes_follow_headers() {
    use std::os::unix::fs::PermissionsExt;

    let dir = tempdir().unwrap();
    let dest = dir.path().join("out");
    Extractor::new(&dest, ExtractOptions::default().strip_components(1))
        .extract(Cursor::new(release_archive()))
        .unwrap();

    let mode = |p: &str| std::fs::metadata(dest.join(p)).unwrap().permissions().mode();
    assert_ne!(mode("bin/tool") & 0o100, 0, "owner exec bit kept");
    assert_eq!(mode("README.md") & 0o111, 0);
}

#[test]
fn test_fully_stripped_entries() {
    let dir = tempdir().unwrap();
    let dest = dir.path().join("out");
    let archive = tar_gz(&[
        Item::File("NOTICE", b"top-level file", 0o644),
        Item::Dir("pkg/"),
        Item::File("pkg/lib.txt", b"lib", 0o644),
    ]);

    let report = Extractor::new(&dest, ExtractOptions::default().strip_components(1))
        .extract(Cursor::new(archive))
        .unwrap();

    assert_eq!(report.skipped, 1);
    assert_eq!(report.directories(), 1);
    assert_eq!(report.entries[0].target_path, dest);
    assert_eq!(
        files_under(&dest),
        BTreeMap::from([(PathBuf::from("lib.txt"), b"lib".to_vec())])
    );
}

#[test]
fn test_symlinks_are_skipped() {
    let dir = tempdir().unwrap();
    let dest = dir.path().join("out");
    let archive = tar_gz(&[
        Item::File("pkg/real.txt", b"real", 0o644),
        Item::Link("pkg/link.txt", "real.txt"),
    ]);

    let report = Extractor::new(&dest, ExtractOptions::default())
        .extract(Cursor::new(archive))
        .unwrap();

    assert_eq!(report.skipped, 1);
    assert!(dest.join("pkg/link.txt").symlink_metadata().is_err());
}

#[test]
fn test_parent_traversal_rejected_and_rolled_back() {
    let dir = tempdir().unwrap();
    let dest = dir.path().join("out");
    let archive = tar_gz(&[
        Item::File("pkg/ok.txt", b"fine", 0o644),
        Item::RawFile(b"pkg/../../escaped.txt", b"gotcha"),
    ]);
    let (options, events) = recorder();

    let err = Extractor::new(&dest, options.remove_on_fail(true))
        .extract(Cursor::new(archive))
        .unwrap_err();

    assert!(matches!(err, Error::UnsafePath { .. }));
    assert_eq!(err.kind(), ErrorKind::Decode);
    assert!(!dest.exists());
    assert!(!dir.path().join("escaped.txt").exists());
    assert!(matches!(
        events.lock().unwrap().last(),
        Some(ExtractEvent::RolledBack { .. })
    ));
}

#[test]
#[cfg(unix)]
fn test_absolute_path_rejected() {
    let dir = tempdir().unwrap();
    let dest = dir.path().join("out");
    let outside = dir.path().join("abs.txt");
    let name = outside.to_str().unwrap().as_bytes().to_vec();
    let archive = tar_gz(&[Item::RawFile(&name, b"gotcha")]);

    let err = Extractor::new(&dest, ExtractOptions::default())
        .extract(Cursor::new(archive))
        .unwrap_err();

    assert!(matches!(err, Error::UnsafePath { .. }));
    assert!(!outside.exists());
}

#[test]
fn test_truncated_entry_rolls_back_new_destination() {
    let dir = tempdir().unwrap();
    let dest = dir.path().join("out");

    let mut header = Header::new_gnu();
    header.set_path("pkg/big.bin").unwrap();
    header.set_size(4096);
    header.set_mode(0o644);
    header.set_cksum();
    let mut raw = header.as_bytes().to_vec();
    raw.extend_from_slice(&[7u8; 100]);

    let err = Extractor::new(&dest, ExtractOptions::default().remove_on_fail(true))
        .extract(Cursor::new(gzip(&raw)))
        .unwrap_err();

    assert!(matches!(err, Error::Truncated { expected: 4096, written: 100, .. }));
    assert!(!dest.exists());
}

#[test]
fn test_rollback_spares_existing_destination_content() {
    let dir = tempdir().unwrap();
    let dest = dir.path().join("out");
    std::fs::create_dir_all(dest.join("keep")).unwrap();
    std::fs::write(dest.join("keep/old.txt"), "old").unwrap();

    let mut archive = tar_gz(&[
        Item::File("fresh/a.txt", &[b'a'; 4096], 0o644),
        Item::File("fresh/b.txt", &[b'b'; 4096], 0o644),
    ]);
    archive.truncate(archive.len() / 2);

    let err = Extractor::new(&dest, ExtractOptions::default().remove_on_fail(true))
        .extract(Cursor::new(archive))
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Decode);
    assert_eq!(std::fs::read_to_string(dest.join("keep/old.txt")).unwrap(), "old");
    assert!(!dest.join("fresh").exists());
}

#[test]
fn test_partial_output_kept_without_remove_on_fail() {
    let dir = tempdir().unwrap();
    let dest = dir.path().join("out");
    let archive = tar_gz(&[
        Item::File("pkg/first.txt", b"first", 0o644),
        Item::RawFile(b"../second.txt", b"second"),
    ]);

    Extractor::new(&dest, ExtractOptions::default())
        .extract(Cursor::new(archive))
        .unwrap_err();

    assert_eq!(std::fs::read(dest.join("pkg/first.txt")).unwrap(), b"first");
}

#[test]
fn test_source_failure_is_upstream() {
    let dir = tempdir().unwrap();
    let dest = dir.path().join("out");
    let archive = release_archive();
    let source = FailingSource {
        fail_at: archive.len() as u64 / 2,
        data: Cursor::new(archive),
    };

    let err = Extractor::new(&dest, ExtractOptions::default().remove_on_fail(true))
        .extract(source)
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Upstream);
    assert!(!dest.exists());
}

#[test]
fn test_garbage_is_decode_error() {
    let dir = tempdir().unwrap();
    let err = Extractor::new(dir.path().join("out"), ExtractOptions::default())
        .extract(Cursor::new(b"definitely not gzip".to_vec()))
        .unwrap_err();

    assert!(matches!(err, Error::Decode(_)));
}

#[test]
fn test_empty_archive_creates_empty_destination() {
    let dir = tempdir().unwrap();
    let dest = dir.path().join("out");

    let report = Extractor::new(&dest, ExtractOptions::default())
        .extract(Cursor::new(tar_gz(&[])))
        .unwrap();

    assert!(report.entries.is_empty());
    assert!(dest.is_dir());
    assert!(files_under(&dest).is_empty());
}

#[test]
fn test_source_consumed_to_the_end() {
    let dir = tempdir().unwrap();
    let mut archive = release_archive();
    archive.extend_from_slice(&[0u8; 777]);
    let len = archive.len() as u64;
    let mut source = Cursor::new(archive);

    Extractor::new(dir.path().join("out"), ExtractOptions::default())
        .extract(&mut source)
        .unwrap();

    assert_eq!(source.position(), len);
}

#[test]
fn test_empty_directory_entries_exist() {
    let dir = tempdir().unwrap();
    let dest = dir.path().join("out");
    let archive = tar_gz(&[
        Item::Dir("pkg/"),
        Item::Dir("pkg/empty/"),
        Item::Dir("pkg/cache/tmp/"),
        Item::File("pkg/a.txt", b"a", 0o644),
    ]);

    let report = Extractor::new(&dest, ExtractOptions::default())
        .extract(Cursor::new(archive))
        .unwrap();

    assert_eq!(report.directories(), 3);
    assert!(dest.join("pkg/empty").is_dir());
    assert!(dest.join("pkg/cache/tmp").is_dir());
}

#[test]
fn test_directory_collapsing_to_root_under_strip() {
    let dir = tempdir().unwrap();
    let dest = dir.path().join("out");
    let archive = tar_gz(&[Item::Dir("top/"), Item::Dir("top/empty/")]);

    let report = Extractor::new(&dest, ExtractOptions::default().strip_components(1))
        .extract(Cursor::new(archive))
        .unwrap();

    assert_eq!(report.entries[0].target_path, dest);
    assert!(dest.is_dir());
    assert!(dest.join("empty").is_dir());
    assert!(files_under(&dest).is_empty());
}

#[test]
fn test_pre_ustar_directory_entry() {
    let dir = tempdir().unwrap();
    let dest = dir.path().join("out");

    let mut builder = tar::Builder::new(GzEncoder::new(Vec::new(), Compression::default()));
    let mut pkg = Header::new_old();
    pkg.as_old_mut().name[..4].copy_from_slice(b"pkg/");
    pkg.set_entry_type(EntryType::Regular);
    pkg.set_mode(0o755);
    pkg.set_size(0);
    pkg.set_cksum();
    builder.append(&pkg, io::empty()).unwrap();

    let mut file = Header::new_old();
    file.set_path("pkg/a.txt").unwrap();
    file.set_entry_type(EntryType::Regular);
    file.set_mode(0o644);
    file.set_size(5);
    file.set_cksum();
    builder.append(&file, &b"hello"[..]).unwrap();
    let archive = builder.into_inner().unwrap().finish().unwrap();

    let report = Extractor::new(&dest, ExtractOptions::default())
        .extract(Cursor::new(archive))
        .unwrap();

    assert_eq!(report.directories(), 1);
    assert_eq!(report.files(), 1);
    assert!(dest.join("pkg").is_dir());
    assert_eq!(std::fs::read(dest.join("pkg/a.txt")).unwrap(), b"hello");
}

#[test]
fn test_failure_without_writes_reports_no_rollback() {
    let dir = tempdir().unwrap();
    let dest = dir.path().join("out");
    std::fs::create_dir_all(&dest).unwrap();
    std::fs::write(dest.join("old.txt"), "old").unwrap();
    let (options, events) = recorder();

    let err = Extractor::new(&dest, options.remove_on_fail(true))
        .extract(Cursor::new(b"definitely not gzip".to_vec()))
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Decode);
    assert!(events.lock().unwrap().is_empty());
    assert_eq!(std::fs::read_to_string(dest.join("old.txt")).unwrap(), "old");
}

fn entry_path(dirs: &[u8], file: u8) -> String {
    let mut segments: Vec<String> = dirs.iter().map(|d| format!("d{d}")).collect();
    segments.push(format!("f{file}.txt"));
    segments.join("/")
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn prop_strip_matches_relocated_plain_extraction(
        layout in prop::collection::vec((prop::collection::vec(0u8..3, 0..3), 0u8..3), 1..6),
        strip in 0usize..3,
    ) {
        let paths: Vec<String> = layout.iter().map(|(dirs, file)| entry_path(dirs, *file)).collect();
        let contents: Vec<Vec<u8>> = (0..paths.len()).map(|i| format!("content {i}").into_bytes()).collect();
        let items: Vec<Item<'_>> = paths
            .iter()
            .zip(&contents)
            .map(|(p, c)| Item::File(p, c, 0o644))
            .collect();
        let archive = tar_gz(&items);

        let dir = tempdir().unwrap();
        let plain = dir.path().join("plain");
        let stripped = dir.path().join("stripped");
        Extractor::new(&plain, ExtractOptions::default())
            .extract(Cursor::new(archive.clone()))
            .unwrap();
        Extractor::new(&stripped, ExtractOptions::default().strip_components(strip))
            .extract(Cursor::new(archive))
            .unwrap();

        let mut expected = BTreeMap::new();
        // Walk archive order so later duplicates win, like overwriting on disk.
        for (path, _) in paths.iter().zip(&contents) {
            let segments: Vec<&str> = path.split('/').collect();
            if segments.len() > strip {
                let relocated: PathBuf = segments[strip..].iter().collect();
                let original = files_under(&plain).remove(&PathBuf::from(path));
                if let Some(original) = original {
                    expected.insert(relocated, original);
                }
            }
        }
        prop_assert_eq!(files_under(&stripped), expected);
    }
}
