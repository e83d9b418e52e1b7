//! CLI integration tests
//!
//! Tests the command-line interface end-to-end.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Output, Stdio};
use tempfile::TempDir;

/// Get path to the lockbox binary
fn lockbox_bin() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // Remove test binary name
    path.pop(); // Remove deps/
    path.push("lockbox");
    path
}

/// Run lockbox with passphrase from stdin
fn run_lockbox_with_passphrase(args: &[&str], passphrase: &str) -> std::io::Result<Output> {
    let mut child = Command::new(lockbox_bin())
        .arg("--passphrase-stdin")
        .args(args)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()?;

    {
        let stdin = child.stdin.as_mut().expect("failed to open stdin");
        // Ignore BrokenPipe errors - the command may exit before reading stdin
        // if it encounters an error (e.g., file not found)
        let _ = stdin.write_all(passphrase.as_bytes());
    }

    child.wait_with_output()
}

/// Get path to testdata directory
fn testdata_path(filename: &str) -> PathBuf {
    let mut path = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    path.push("testdata");
    path.push(filename);
    path
}

fn arg(path: &Path) -> &str {
    path.to_str().unwrap()
}

fn assert_success(output: &Output, what: &str) {
    assert!(
        output.status.success(),
        "{} failed: {}",
        what,
        String::from_utf8_lossy(&output.stderr)
    );
}

fn encrypt_to(input: &Path, output: &Path, passphrase: &str) {
    let result =
        run_lockbox_with_passphrase(&["encrypt", arg(input), "-o", arg(output)], passphrase)
            .unwrap();
    assert_success(&result, "encrypt");
}

/// Decrypt known ciphertext.
#[test]
fn test_decrypt_known_ciphertext() {
    let temp_dir = TempDir::new().unwrap();
    let output = temp_dir.path().join("hello-decrypted.txt");

    let result = run_lockbox_with_passphrase(
        &[
            "decrypt",
            arg(&testdata_path("hello.txt.lockbox")),
            "-o",
            arg(&output),
        ],
        "test",
    )
    .unwrap();
    assert_success(&result, "decrypt");

    let decrypted = fs::read_to_string(&output).unwrap();
    let expected = fs::read_to_string(testdata_path("hello.txt")).unwrap();
    assert_eq!(decrypted, expected);
}

/// Decrypt a known file made of two envelope lines.
#[test]
fn test_decrypt_known_chunked_ciphertext() {
    let temp_dir = TempDir::new().unwrap();
    let output = temp_dir.path().join("chunked.txt");

    let result = run_lockbox_with_passphrase(
        &[
            "decrypt",
            arg(&testdata_path("chunked.txt.lockbox")),
            "-o",
            arg(&output),
        ],
        "test",
    )
    .unwrap();
    assert_success(&result, "decrypt");

    assert_eq!(
        fs::read(&output).unwrap(),
        fs::read(testdata_path("chunked.txt")).unwrap()
    );
}

#[test]
fn test_encrypt_decrypt_roundtrip() {
    let temp_dir = TempDir::new().unwrap();
    let plaintext_path = testdata_path("hello.txt");
    let encrypted_path = temp_dir.path().join("hello.txt.lockbox");

    encrypt_to(&plaintext_path, &encrypted_path, "test");

    // No -o: the output name is inferred by dropping the suffix.
    let result =
        run_lockbox_with_passphrase(&["decrypt", arg(&encrypted_path)], "test").unwrap();
    assert_success(&result, "decrypt");

    let original = fs::read_to_string(&plaintext_path).unwrap();
    let decrypted = fs::read_to_string(temp_dir.path().join("hello.txt")).unwrap();
    assert_eq!(original, decrypted);
    assert!(encrypted_path.exists());
}

#[test]
fn test_encrypt_without_output_prints_envelopes() {
    let result =
        run_lockbox_with_passphrase(&["encrypt", arg(&testdata_path("hello.txt"))], "test")
            .unwrap();
    assert_success(&result, "encrypt");

    let stdout = String::from_utf8(result.stdout).unwrap();
    let lines: Vec<&str> = stdout.lines().collect();
    assert_eq!(lines.len(), 1);
    assert!(lines[0].contains('$'));
}

#[test]
fn test_string_roundtrip() {
    let result = run_lockbox_with_passphrase(&["encrypt", "-s", "attack at dawn"], "pw").unwrap();
    assert_success(&result, "encrypt");
    let envelope = String::from_utf8(result.stdout).unwrap();

    let result = run_lockbox_with_passphrase(&["d", "-s", envelope.trim_end()], "pw").unwrap();
    assert_success(&result, "decrypt");
    assert_eq!(result.stdout, b"attack at dawn\n");
}

#[test]
fn test_string_with_wrong_passphrase_fails() {
    let result = run_lockbox_with_passphrase(&["encrypt", "-s", "secret"], "right").unwrap();
    assert_success(&result, "encrypt");
    let envelope = String::from_utf8(result.stdout).unwrap();

    let result =
        run_lockbox_with_passphrase(&["decrypt", "-s", envelope.trim_end()], "wrong").unwrap();
    assert_eq!(result.status.code(), Some(1));
    assert!(result.stdout.is_empty());
    let stderr = String::from_utf8_lossy(&result.stderr);
    assert!(
        stderr.contains("Error:") && stderr.contains("bad passphrase"),
        "Expected error message about the passphrase, got: {}",
        stderr
    );
}

#[test]
fn test_string_to_qr_code() {
    let temp_dir = TempDir::new().unwrap();
    let image = temp_dir.path().join("envelope.png");

    let result =
        run_lockbox_with_passphrase(&["encrypt", "-s", "wifi password", "-o", arg(&image)], "pw")
            .unwrap();
    assert_success(&result, "encrypt");

    let bytes = fs::read(&image).unwrap();
    assert_eq!(&bytes[..4], b"\x89PNG");
}

#[test]
fn test_decrypt_nonexistent_file_fails() {
    let temp_dir = TempDir::new().unwrap();
    let nonexistent = temp_dir.path().join("nonexistent.lockbox");
    let output = temp_dir.path().join("output.txt");

    let result = run_lockbox_with_passphrase(
        &["decrypt", arg(&nonexistent), "-o", arg(&output)],
        "test",
    )
    .unwrap();

    assert!(!result.status.success());
    assert!(String::from_utf8_lossy(&result.stderr).contains("does not exist"));
    assert!(!output.exists());
}

#[test]
fn test_decrypt_with_wrong_passphrase_leaves_no_output() {
    let temp_dir = TempDir::new().unwrap();
    let encrypted = temp_dir.path().join("hello.txt.lockbox");
    fs::copy(testdata_path("hello.txt.lockbox"), &encrypted).unwrap();

    let result = run_lockbox_with_passphrase(&["decrypt", arg(&encrypted)], "wrong").unwrap();

    assert!(!result.status.success());
    assert!(!temp_dir.path().join("hello.txt").exists());
    assert_eq!(fs::read_dir(temp_dir.path()).unwrap().count(), 1);
}

#[test]
fn test_decrypt_requires_output_without_suffix() {
    let result =
        run_lockbox_with_passphrase(&["decrypt", arg(&testdata_path("hello.txt"))], "test")
            .unwrap();

    assert!(!result.status.success());
    assert!(String::from_utf8_lossy(&result.stderr).contains("--output"));
}

#[test]
fn test_existing_output_is_not_overwritten_without_force() {
    let temp_dir = TempDir::new().unwrap();
    let encrypted = temp_dir.path().join("out.lockbox");
    fs::write(&encrypted, b"keep me").unwrap();

    // stderr is not a terminal here, so nobody can be asked.
    let result = run_lockbox_with_passphrase(
        &["encrypt", arg(&testdata_path("hello.txt")), "-o", arg(&encrypted)],
        "test",
    )
    .unwrap();
    assert!(!result.status.success());
    assert_eq!(fs::read(&encrypted).unwrap(), b"keep me");

    let result = run_lockbox_with_passphrase(
        &[
            "encrypt",
            arg(&testdata_path("hello.txt")),
            "-o",
            arg(&encrypted),
            "--force",
        ],
        "test",
    )
    .unwrap();
    assert_success(&result, "encrypt --force");
    assert_ne!(fs::read(&encrypted).unwrap(), b"keep me");
}

#[test]
fn test_remove_original() {
    let temp_dir = TempDir::new().unwrap();
    let plaintext = temp_dir.path().join("doomed.txt");
    let encrypted = temp_dir.path().join("doomed.txt.lockbox");
    fs::write(&plaintext, b"short lived").unwrap();

    let result = run_lockbox_with_passphrase(
        &[
            "encrypt",
            arg(&plaintext),
            "-o",
            arg(&encrypted),
            "--remove-original",
        ],
        "test",
    )
    .unwrap();
    assert_success(&result, "encrypt");
    assert!(!plaintext.exists());

    let result = run_lockbox_with_passphrase(
        &["decrypt", arg(&encrypted), "--remove-original"],
        "test",
    )
    .unwrap();
    assert_success(&result, "decrypt");
    assert!(!encrypted.exists());
    assert_eq!(fs::read(&plaintext).unwrap(), b"short lived");
}

#[test]
fn test_empty_file_roundtrip() {
    let temp_dir = TempDir::new().unwrap();
    let plaintext = temp_dir.path().join("empty.txt");
    let encrypted = temp_dir.path().join("empty.txt.lockbox");
    let decrypted = temp_dir.path().join("empty-decrypted.txt");

    fs::write(&plaintext, b"").unwrap();
    encrypt_to(&plaintext, &encrypted, "test");
    assert_eq!(fs::read(&encrypted).unwrap(), b"");

    let result = run_lockbox_with_passphrase(
        &["decrypt", arg(&encrypted), "-o", arg(&decrypted)],
        "test",
    )
    .unwrap();

    assert_success(&result, "decrypt");
    let content = fs::read(&decrypted).unwrap();
    assert_eq!(content, b"");
}

#[test]
fn test_large_file_roundtrip() {
    let temp_dir = TempDir::new().unwrap();
    let plaintext = temp_dir.path().join("large.bin");
    let encrypted = temp_dir.path().join("large.bin.lockbox");
    let decrypted = temp_dir.path().join("large-decrypted.bin");

    let large_content: Vec<u8> = (0..1024 * 1024).map(|i| (i % 251) as u8).collect();
    fs::write(&plaintext, &large_content).unwrap();

    encrypt_to(&plaintext, &encrypted, "test");

    let result = run_lockbox_with_passphrase(
        &["decrypt", arg(&encrypted), "-o", arg(&decrypted)],
        "test",
    )
    .unwrap();

    assert_success(&result, "decrypt");
    let decrypted_content = fs::read(&decrypted).unwrap();
    assert_eq!(decrypted_content, large_content);
}

#[test]
fn test_directory_requires_recursive_flag() {
    let temp_dir = TempDir::new().unwrap();
    fs::write(temp_dir.path().join("a.txt"), b"a").unwrap();

    let result =
        run_lockbox_with_passphrase(&["encrypt", arg(temp_dir.path())], "test").unwrap();

    assert!(!result.status.success());
    assert!(String::from_utf8_lossy(&result.stderr).contains("--recursive"));
    assert!(temp_dir.path().join("a.txt").exists());
}

#[test]
fn test_recursive_directory_roundtrip() {
    let temp_dir = TempDir::new().unwrap();
    let root = temp_dir.path();
    fs::create_dir_all(root.join("docs/old")).unwrap();
    fs::write(root.join("top.txt"), b"top").unwrap();
    fs::write(root.join("docs/readme.md"), b"# readme").unwrap();
    fs::write(root.join("docs/old/archive.bin"), [0u8, 159, 146, 150]).unwrap();

    let result = run_lockbox_with_passphrase(&["encrypt", "-r", arg(root)], "test").unwrap();
    assert_success(&result, "encrypt -r");
    assert!(!root.join("top.txt").exists());
    assert!(root.join("top.txt.lockbox").exists());
    assert!(root.join("docs/readme.md.lockbox").exists());
    assert!(root.join("docs/old/archive.bin.lockbox").exists());

    let result = run_lockbox_with_passphrase(&["decrypt", "-r", arg(root)], "test").unwrap();
    assert_success(&result, "decrypt -r");
    assert!(!root.join("top.txt.lockbox").exists());
    assert_eq!(fs::read(root.join("top.txt")).unwrap(), b"top");
    assert_eq!(fs::read(root.join("docs/readme.md")).unwrap(), b"# readme");
    assert_eq!(
        fs::read(root.join("docs/old/archive.bin")).unwrap(),
        [0u8, 159, 146, 150]
    );
}

#[test]
fn test_passphrase_stdin_conflicts_with_stdin_data() {
    let result = run_lockbox_with_passphrase(&["encrypt"], "test").unwrap();

    assert_eq!(result.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&result.stderr).contains("--passphrase-stdin"));
}

#[test]
fn test_string_conflicts_with_input() {
    let result = run_lockbox_with_passphrase(
        &["encrypt", "-s", "text", arg(&testdata_path("hello.txt"))],
        "test",
    )
    .unwrap();

    assert!(!result.status.success());
}
