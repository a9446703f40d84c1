use assert_cmd::prelude::*;
use predicates::prelude::*;
use std::fs;
use std::io::Write;
use std::process::Command;
use tempfile::tempdir;

#[test]
fn test_cli_create_list_validate_extract_cycle() -> Result<(), Box<dyn std::error::Error>> {
    // 1. Setup: a temporary tree with a nested directory
    let source_dir = tempdir()?;
    let root = source_dir.path().join("project");
    fs::create_dir(&root)?;
    let nested = root.join("nested");
    fs::create_dir(&nested)?;

    let mut file1 = fs::File::create(root.join("file1.txt"))?;
    writeln!(file1, "Hello, this is the first file.")?;
    let mut file2 = fs::File::create(nested.join("file2.dat"))?;
    file2.write_all(&[0, 1, 2, 3, 4, 5])?;

    let archive_dir = tempdir()?;
    let archive_path = archive_dir.path().join("project.cat");

    // 2. Create archive
    let mut cmd = Command::cargo_bin("catfile")?;
    cmd.arg("create")
        .arg("--output")
        .arg(&archive_path)
        .arg("--compression")
        .arg("zstd")
        .arg("--checksum")
        .arg("sha256")
        .arg(&root);
    cmd.assert().success();
    assert!(archive_path.exists());

    // 3. List contents
    let mut cmd = Command::cargo_bin("catfile")?;
    cmd.arg("list").arg(&archive_path);
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("project/file1.txt"))
        .stdout(predicate::str::contains("project/nested/file2.dat"));

    // 4. Validate
    let mut cmd = Command::cargo_bin("catfile")?;
    cmd.arg("validate").arg(&archive_path);
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("OK"));

    // 5. Extract and compare
    let extract_dir = tempdir()?;
    let mut cmd = Command::cargo_bin("catfile")?;
    cmd.arg("extract")
        .arg(&archive_path)
        .arg("--output")
        .arg(extract_dir.path());
    cmd.assert().success();

    assert_eq!(
        fs::read(extract_dir.path().join("project/file1.txt"))?,
        fs::read(root.join("file1.txt"))?
    );
    assert_eq!(
        fs::read(extract_dir.path().join("project/nested/file2.dat"))?,
        vec![0, 1, 2, 3, 4, 5]
    );
    Ok(())
}

#[test]
fn test_cli_subcommand_aliases() -> Result<(), Box<dyn std::error::Error>> {
    let source_dir = tempdir()?;
    let input = source_dir.path().join("note.txt");
    fs::write(&input, "short note")?;

    let archive_dir = tempdir()?;
    let archive_path = archive_dir.path().join("note.cat");

    let mut cmd = Command::cargo_bin("catfile")?;
    cmd.arg("c")
        .arg("--output")
        .arg(&archive_path)
        .arg("--compression")
        .arg("none")
        .arg(&input);
    cmd.assert().success();

    let mut cmd = Command::cargo_bin("catfile")?;
    cmd.arg("l").arg(&archive_path);
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("note.txt"));

    let mut cmd = Command::cargo_bin("catfile")?;
    cmd.arg("v").arg(&archive_path);
    cmd.assert().success();
    Ok(())
}

#[test]
fn test_cli_repack_between_codecs() -> Result<(), Box<dyn std::error::Error>> {
    let source_dir = tempdir()?;
    let input = source_dir.path().join("body.txt");
    fs::write(&input, "repack me across codecs")?;

    let archive_dir = tempdir()?;
    let gzip_path = archive_dir.path().join("body-gz.cat");
    let zstd_path = archive_dir.path().join("body-zstd.cat");

    let mut cmd = Command::cargo_bin("catfile")?;
    cmd.arg("create")
        .arg("--output")
        .arg(&gzip_path)
        .arg("--compression")
        .arg("gzip")
        .arg(&input);
    cmd.assert().success();

    let mut cmd = Command::cargo_bin("catfile")?;
    cmd.arg("repack")
        .arg(&gzip_path)
        .arg("--output")
        .arg(&zstd_path)
        .arg("--compression")
        .arg("zstd");
    cmd.assert().success();

    let mut cmd = Command::cargo_bin("catfile")?;
    cmd.arg("validate").arg(&zstd_path);
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("OK"));
    Ok(())
}

#[test]
fn test_cli_validate_fails_on_corruption() -> Result<(), Box<dyn std::error::Error>> {
    let source_dir = tempdir()?;
    let input = source_dir.path().join("payload.bin");
    fs::write(&input, "CORRUPTION-TARGET-PAYLOAD")?;

    let archive_dir = tempdir()?;
    let archive_path = archive_dir.path().join("payload.cat");

    let mut cmd = Command::cargo_bin("catfile")?;
    cmd.arg("create")
        .arg("--output")
        .arg(&archive_path)
        .arg("--compression")
        .arg("none")
        .arg(&input);
    cmd.assert().success();

    let mut bytes = fs::read(&archive_path)?;
    let needle = b"CORRUPTION-TARGET-PAYLOAD";
    let pos = bytes
        .windows(needle.len())
        .position(|w| w == needle)
        .expect("payload not found");
    bytes[pos] ^= 0x01;
    fs::write(&archive_path, &bytes)?;

    let mut cmd = Command::cargo_bin("catfile")?;
    cmd.arg("validate").arg(&archive_path);
    cmd.assert()
        .failure()
        .stdout(predicate::str::contains("FAILED"));
    Ok(())
}

#[test]
fn test_cli_convert_tar() -> Result<(), Box<dyn std::error::Error>> {
    let source_dir = tempdir()?;
    let file_path = source_dir.path().join("doc.txt");
    fs::write(&file_path, "tar born")?;

    let tar_path = source_dir.path().join("input.tar");
    let mut builder = tar::Builder::new(fs::File::create(&tar_path)?);
    builder.append_path_with_name(&file_path, "doc.txt")?;
    builder.finish()?;

    let archive_dir = tempdir()?;
    let archive_path = archive_dir.path().join("from-tar.cat");

    let mut cmd = Command::cargo_bin("catfile")?;
    cmd.arg("create")
        .arg("--convert")
        .arg("tar")
        .arg("--output")
        .arg(&archive_path)
        .arg(&tar_path);
    cmd.assert().success();

    let mut cmd = Command::cargo_bin("catfile")?;
    cmd.arg("list").arg(&archive_path);
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("doc.txt"));
    Ok(())
}
