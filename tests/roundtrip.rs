use std::fs;
use std::io::Write;
use std::os::unix::fs::MetadataExt;
use std::path::PathBuf;

use tempfile::tempdir;

use catfile::checksum::{ChecksumAlgo, ChecksumSet};
use catfile::envelope::{Codec, CompressionChoice};
use catfile::list::{list_entries, ListOptions};
use catfile::pack::{pack, PackOptions};
use catfile::repack::{repack, RepackOptions};
use catfile::unpack::{unpack, UnpackOptions};
use catfile::validate::{validate, ValidateOptions};
use catfile::EntryKind;

fn store_options() -> PackOptions {
    PackOptions {
        compression: CompressionChoice::Codec(Codec::Store),
        ..PackOptions::default()
    }
}

fn write_file(path: &PathBuf, data: &[u8]) {
    let mut f = fs::File::create(path).unwrap();
    f.write_all(data).unwrap();
}

#[test]
fn pack_unpack_tree_roundtrip() {
    let source = tempdir().unwrap();
    let root = source.path().join("tree");
    fs::create_dir_all(root.join("nested")).unwrap();
    write_file(&root.join("hello.txt"), b"Hello, container.\n");
    write_file(&root.join("nested").join("blob.bin"), &[0u8, 1, 2, 3, 4, 5]);
    write_file(&root.join("empty"), b"");

    let work = tempdir().unwrap();
    let archive = work.path().join("tree.cat");
    pack(&[root.clone()], &archive, &store_options()).unwrap();

    let report = validate(&archive, &ValidateOptions::default()).unwrap();
    assert!(report.valid);
    // tree, tree/empty, tree/hello.txt, tree/nested, tree/nested/blob.bin
    assert_eq!(report.entries.len(), 5);

    let out = work.path().join("out");
    let unpacked = unpack(&archive, &out, &UnpackOptions::default()).unwrap();
    assert_eq!(unpacked.entries, 5);
    assert!(unpacked.warnings.is_empty());

    assert_eq!(
        fs::read(out.join("tree/hello.txt")).unwrap(),
        b"Hello, container.\n"
    );
    assert_eq!(
        fs::read(out.join("tree/nested/blob.bin")).unwrap(),
        vec![0u8, 1, 2, 3, 4, 5]
    );
    assert_eq!(fs::read(out.join("tree/empty")).unwrap(), Vec::<u8>::new());
}

#[test]
fn list_matches_unpack() {
    let source = tempdir().unwrap();
    let root = source.path().join("data");
    fs::create_dir_all(&root).unwrap();
    write_file(&root.join("a"), b"aaaa");
    write_file(&root.join("b"), b"bb");

    let work = tempdir().unwrap();
    let archive = work.path().join("data.cat");
    pack(&[root], &archive, &store_options()).unwrap();

    let entries = list_entries(&archive, &ListOptions::default()).unwrap();
    let names: Vec<&str> = entries.iter().map(|e| e.path.as_str()).collect();
    assert_eq!(names, ["data", "data/a", "data/b"]);
    assert_eq!(entries[0].kind, EntryKind::Directory);
    assert_eq!(entries[1].size, 4);
    assert_eq!(entries[2].size, 2);

    let out = work.path().join("out");
    unpack(&archive, &out, &UnpackOptions::default()).unwrap();
    for e in &entries {
        assert!(out.join(&e.path).exists(), "missing {}", e.path);
    }
}

#[test]
fn symlink_and_hard_link_fidelity() {
    let source = tempdir().unwrap();
    let a = source.path().join("a.txt");
    write_file(&a, b"0123456789");
    let b = source.path().join("b");
    std::os::unix::fs::symlink("a.txt", &b).unwrap();
    let c = source.path().join("c");
    fs::hard_link(&a, &c).unwrap();

    let work = tempdir().unwrap();
    let archive = work.path().join("links.cat");
    pack(&[a, b, c], &archive, &store_options()).unwrap();

    let entries = list_entries(&archive, &ListOptions::default()).unwrap();
    assert_eq!(entries.len(), 3);
    assert_eq!(entries[0].kind, EntryKind::Regular);
    assert_eq!(entries[1].kind, EntryKind::Symlink);
    assert_eq!(entries[1].link_target, "a.txt");
    assert_eq!(entries[2].kind, EntryKind::HardLink);
    assert_eq!(entries[2].link_target, "a.txt");
    let sizes: Vec<u64> = entries.iter().map(|e| e.size).collect();
    assert_eq!(sizes, [10, 0, 0]);

    let report = validate(&archive, &ValidateOptions::default()).unwrap();
    assert!(report.valid);

    let out = work.path().join("out");
    unpack(&archive, &out, &UnpackOptions::default()).unwrap();
    assert_eq!(fs::read(out.join("a.txt")).unwrap(), b"0123456789");
    assert_eq!(
        fs::read_link(out.join("b")).unwrap(),
        PathBuf::from("a.txt")
    );
    // The hard link shares an inode with its target.
    let ino_a = fs::metadata(out.join("a.txt")).unwrap().ino();
    let ino_c = fs::metadata(out.join("c")).unwrap().ino();
    assert_eq!(ino_a, ino_c);
    assert_eq!(fs::read(out.join("c")).unwrap(), b"0123456789");
}

#[test]
fn corruption_is_localized_to_one_entry() {
    let source = tempdir().unwrap();
    let root = source.path().join("files");
    fs::create_dir_all(&root).unwrap();
    write_file(&root.join("clean.txt"), b"unharmed content here");
    write_file(&root.join("victim.txt"), b"SENTINEL-PAYLOAD-BYTES");

    let work = tempdir().unwrap();
    let archive = work.path().join("files.cat");
    pack(&[root], &archive, &store_options()).unwrap();

    // Store codec keeps content in the clear; flip one payload byte.
    let mut bytes = fs::read(&archive).unwrap();
    let needle = b"SENTINEL-PAYLOAD-BYTES";
    let pos = bytes
        .windows(needle.len())
        .position(|w| w == needle)
        .expect("payload not found in container");
    bytes[pos] ^= 0x01;
    fs::write(&archive, &bytes).unwrap();

    let report = validate(&archive, &ValidateOptions::default()).unwrap();
    assert!(!report.valid);
    let failed: Vec<&str> = report
        .entries
        .iter()
        .filter(|e| !e.passed())
        .map(|e| e.path.as_str())
        .collect();
    assert_eq!(failed, ["files/victim.txt"]);
    for e in report.entries.iter().filter(|e| e.passed()) {
        assert!(e.header_ok && e.content_ok, "{} should be intact", e.path);
    }
}

#[test]
fn compressed_envelopes_auto_detect() {
    let source = tempdir().unwrap();
    let root = source.path().join("payload");
    fs::create_dir_all(&root).unwrap();
    write_file(&root.join("text.txt"), "squeeze me ".repeat(500).as_bytes());

    let work = tempdir().unwrap();
    for codec in [Codec::Gzip, Codec::Bzip2, Codec::Xz, Codec::Zstd, Codec::Lz4] {
        let archive = work.path().join(format!("payload-{codec}.cat"));
        let opts = PackOptions {
            compression: CompressionChoice::Codec(codec),
            ..PackOptions::default()
        };
        pack(&[root.clone()], &archive, &opts).unwrap();

        // No pinned codec on the read side; magic detection does the work.
        let report = validate(&archive, &ValidateOptions::default()).unwrap();
        assert!(report.valid, "{codec} container failed validation");

        let out = work.path().join(format!("out-{codec}"));
        unpack(&archive, &out, &UnpackOptions::default()).unwrap();
        assert_eq!(
            fs::read(out.join("payload/text.txt")).unwrap(),
            "squeeze me ".repeat(500).into_bytes()
        );
    }
}

#[test]
fn brotli_requires_pinned_codec() {
    let source = tempdir().unwrap();
    let root = source.path().join("br");
    fs::create_dir_all(&root).unwrap();
    write_file(&root.join("f"), b"brotli carries no magic bytes");

    let work = tempdir().unwrap();
    let archive = work.path().join("br.cat");
    let opts = PackOptions {
        compression: CompressionChoice::Codec(Codec::Brotli),
        ..PackOptions::default()
    };
    pack(&[root], &archive, &opts).unwrap();

    // Auto-detection falls back to store and must fail on the magic check.
    assert!(validate(&archive, &ValidateOptions::default()).is_err());

    let pinned = ValidateOptions {
        codec: Some(Codec::Brotli),
        ..ValidateOptions::default()
    };
    let report = validate(&archive, &pinned).unwrap();
    assert!(report.valid);
}

#[test]
fn repack_keep_preserves_digests() {
    let source = tempdir().unwrap();
    let root = source.path().join("rk");
    fs::create_dir_all(&root).unwrap();
    write_file(&root.join("one"), b"first file");
    write_file(&root.join("two"), b"second file");

    let work = tempdir().unwrap();
    let archive = work.path().join("rk.cat");
    let opts = PackOptions {
        compression: CompressionChoice::Codec(Codec::Gzip),
        checksums: ChecksumSet::uniform(ChecksumAlgo::Sha256),
        ..PackOptions::default()
    };
    pack(&[root], &archive, &opts).unwrap();

    let repacked = work.path().join("rk-zstd.cat");
    let ropts = RepackOptions {
        compression: CompressionChoice::Codec(Codec::Zstd),
        checksum: None,
        ..RepackOptions::default()
    };
    repack(&archive, &repacked, &ropts).unwrap();

    // Stored digests survived the rewrite and still verify as sha256.
    let vopts = ValidateOptions {
        method: Some(ChecksumAlgo::Sha256),
        ..ValidateOptions::default()
    };
    let report = validate(&repacked, &vopts).unwrap();
    assert!(report.valid);
    assert_eq!(
        list_entries(&archive, &ListOptions::default())
            .unwrap()
            .len(),
        list_entries(&repacked, &ListOptions::default())
            .unwrap()
            .len()
    );
}

#[test]
fn repack_recompute_switches_method() {
    let source = tempdir().unwrap();
    let root = source.path().join("rr");
    fs::create_dir_all(&root).unwrap();
    write_file(&root.join("data"), b"digest me again");

    let work = tempdir().unwrap();
    let archive = work.path().join("rr.cat");
    pack(&[root], &archive, &store_options()).unwrap();

    let repacked = work.path().join("rr-md5.cat");
    let ropts = RepackOptions {
        compression: CompressionChoice::Codec(Codec::Store),
        checksum: Some(ChecksumAlgo::Md5),
        ..RepackOptions::default()
    };
    repack(&archive, &repacked, &ropts).unwrap();

    let vopts = ValidateOptions {
        method: Some(ChecksumAlgo::Md5),
        ..ValidateOptions::default()
    };
    let report = validate(&repacked, &vopts).unwrap();
    assert!(report.valid);

    let unpacked = work.path().join("out");
    unpack(&repacked, &unpacked, &UnpackOptions::default()).unwrap();
    assert_eq!(fs::read(unpacked.join("rr/data")).unwrap(), b"digest me again");
}

#[test]
fn checksum_none_still_roundtrips() {
    let source = tempdir().unwrap();
    let root = source.path().join("nc");
    fs::create_dir_all(&root).unwrap();
    write_file(&root.join("f"), b"no digests at all");

    let work = tempdir().unwrap();
    let archive = work.path().join("nc.cat");
    let opts = PackOptions {
        compression: CompressionChoice::Codec(Codec::Store),
        checksums: ChecksumSet::uniform(ChecksumAlgo::None),
        ..PackOptions::default()
    };
    pack(&[root], &archive, &opts).unwrap();

    let report = validate(&archive, &ValidateOptions::default()).unwrap();
    assert!(report.valid);

    let out = work.path().join("out");
    unpack(&archive, &out, &UnpackOptions::default()).unwrap();
    assert_eq!(fs::read(out.join("nc/f")).unwrap(), b"no digests at all");
}

#[test]
fn preserve_restores_mode_and_mtime() {
    use std::os::unix::fs::PermissionsExt;

    let source = tempdir().unwrap();
    let root = source.path().join("attrs");
    fs::create_dir_all(&root).unwrap();
    let f = root.join("script.sh");
    write_file(&f, b"#!/bin/sh\ntrue\n");
    fs::set_permissions(&f, fs::Permissions::from_mode(0o750)).unwrap();
    let before = fs::metadata(&f).unwrap().mtime();

    let work = tempdir().unwrap();
    let archive = work.path().join("attrs.cat");
    pack(&[root], &archive, &store_options()).unwrap();

    let out = work.path().join("out");
    let opts = UnpackOptions {
        preserve: true,
        ..UnpackOptions::default()
    };
    unpack(&archive, &out, &opts).unwrap();

    let meta = fs::metadata(out.join("attrs/script.sh")).unwrap();
    assert_eq!(meta.permissions().mode() & 0o7777, 0o750);
    assert_eq!(meta.mtime(), before);
}

#[test]
fn dot_input_round_trips() {
    let source = tempdir().unwrap();
    fs::create_dir(source.path().join("sub")).unwrap();
    write_file(&source.path().join("top.txt"), b"top");
    write_file(&source.path().join("sub").join("inner.txt"), b"inner");

    let work = tempdir().unwrap();
    let archive = work.path().join("dot.cat");

    // Pack the current directory itself; the archive path is absolute so
    // only the inputs are resolved relative to the source tree.
    let prev = std::env::current_dir().unwrap();
    std::env::set_current_dir(source.path()).unwrap();
    let packed = pack(&[PathBuf::from(".")], &archive, &store_options());
    std::env::set_current_dir(prev).unwrap();
    packed.unwrap();

    let entries = list_entries(&archive, &ListOptions::default()).unwrap();
    let names: Vec<&str> = entries.iter().map(|e| e.path.as_str()).collect();
    assert_eq!(names, ["sub", "sub/inner.txt", "top.txt"]);

    let out = work.path().join("out");
    let report = unpack(&archive, &out, &UnpackOptions::default()).unwrap();
    assert_eq!(report.entries, 3);
    assert_eq!(fs::read(out.join("top.txt")).unwrap(), b"top");
    assert_eq!(fs::read(out.join("sub/inner.txt")).unwrap(), b"inner");
}

/// Builds a container byte stream directly, bypassing the filesystem walk.
fn craft_container(
    count: u64,
    fill: impl FnOnce(&mut catfile::record::RecordEncoder<Vec<u8>>),
) -> Vec<u8> {
    use catfile::format::FormatDescriptor;
    use catfile::record::{write_container_header, RecordEncoder};

    let desc = FormatDescriptor::default();
    let mut bytes = Vec::new();
    write_container_header(&mut bytes, &desc, count).unwrap();
    let mut enc = RecordEncoder::new(bytes, &desc, ChecksumSet::default()).unwrap();
    fill(&mut enc);
    let (bytes, written) = enc.finish().unwrap();
    assert_eq!(written, count);
    bytes
}

#[test]
fn regular_entry_does_not_write_through_symlink() {
    use catfile::entry::SourceEntry;
    use std::io::Read;

    let work = tempdir().unwrap();
    let outside = work.path().join("outside.txt");
    fs::write(&outside, b"original").unwrap();

    // A symlink record pointing outside the output directory, followed by a
    // regular record at the same path.
    let bytes = craft_container(2, |enc| {
        enc.write_entry(SourceEntry {
            kind: EntryKind::Symlink,
            path: "evil".to_string(),
            link_target: outside.to_string_lossy().into_owned(),
            size: 0,
            atime: 0,
            mtime: 0,
            mode: 0o120777,
            uid: 0,
            gid: 0,
            content: None,
        })
        .unwrap();
        let mut payload: &[u8] = b"OWNED";
        enc.write_entry(SourceEntry {
            kind: EntryKind::Regular,
            path: "evil".to_string(),
            link_target: String::new(),
            size: 5,
            atime: 0,
            mtime: 0,
            mode: 0o100644,
            uid: 0,
            gid: 0,
            content: Some(&mut payload as &mut dyn Read),
        })
        .unwrap();
    });

    let archive = work.path().join("evil.cat");
    fs::write(&archive, &bytes).unwrap();

    let out = work.path().join("out");
    unpack(&archive, &out, &UnpackOptions::default()).unwrap();

    // The file outside the tree is untouched; the content landed in a fresh
    // regular file that replaced the link.
    assert_eq!(fs::read(&outside).unwrap(), b"original");
    assert_eq!(fs::read(out.join("evil")).unwrap(), b"OWNED");
    let meta = fs::symlink_metadata(out.join("evil")).unwrap();
    assert!(!meta.file_type().is_symlink());
}

#[test]
fn forward_hard_link_reference_is_fatal() {
    use catfile::entry::SourceEntry;
    use catfile::ArchiveError;

    let bytes = craft_container(1, |enc| {
        enc.write_entry(SourceEntry {
            kind: EntryKind::HardLink,
            path: "c".to_string(),
            link_target: "a.txt".to_string(),
            size: 0,
            atime: 0,
            mtime: 0,
            mode: 0o100644,
            uid: 0,
            gid: 0,
            content: None,
        })
        .unwrap();
    });

    let work = tempdir().unwrap();
    let archive = work.path().join("forward.cat");
    fs::write(&archive, &bytes).unwrap();

    let out = work.path().join("out");
    let err = unpack(&archive, &out, &UnpackOptions::default()).unwrap_err();
    match err {
        ArchiveError::HardLinkOrdering { path, target } => {
            assert_eq!(path, "c");
            assert_eq!(target, "a.txt");
        }
        other => panic!("expected HardLinkOrdering, got {other}"),
    }
    assert!(!out.join("c").exists());
}

#[test]
fn unpack_warns_on_corruption_and_continues() {
    use catfile::error::ChecksumPart;

    let source = tempdir().unwrap();
    let root = source.path().join("files");
    fs::create_dir_all(&root).unwrap();
    write_file(&root.join("clean.txt"), b"unharmed content here");
    write_file(&root.join("victim.txt"), b"SENTINEL-PAYLOAD-BYTES");

    let work = tempdir().unwrap();
    let archive = work.path().join("files.cat");
    pack(&[root], &archive, &store_options()).unwrap();

    let mut bytes = fs::read(&archive).unwrap();
    let needle = b"SENTINEL-PAYLOAD-BYTES";
    let pos = bytes
        .windows(needle.len())
        .position(|w| w == needle)
        .expect("payload not found in container");
    bytes[pos] ^= 0x01;
    fs::write(&archive, &bytes).unwrap();

    // Extraction finishes; the mismatch is a warning, not an abort.
    let out = work.path().join("out");
    let report = unpack(&archive, &out, &UnpackOptions::default()).unwrap();
    assert_eq!(report.entries, 3);
    assert_eq!(report.warnings.len(), 1);
    assert_eq!(report.warnings[0].path, "files/victim.txt");
    assert_eq!(report.warnings[0].part, ChecksumPart::Content);

    // The intact sibling extracted normally; the damaged bytes are still
    // written out as stored.
    assert_eq!(
        fs::read(out.join("files/clean.txt")).unwrap(),
        b"unharmed content here"
    );
    assert_eq!(
        fs::read(out.join("files/victim.txt")).unwrap().len(),
        needle.len()
    );
}
