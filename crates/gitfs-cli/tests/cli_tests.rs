//! Argument parsing and option merging for the `gitfs` binary.

#![allow(clippy::unwrap_used)]

use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::Parser;
use gitfs_cli::config::Config;
use gitfs_cli::repository::open_or_clone;
use gitfs_cli::{Cli, Command, MountArgs, mount_options, run, version_string};
use gitfs_testutil::release_fixture;
use rstest::rstest;

fn parse(args: &[&str]) -> Cli {
    Cli::try_parse_from(args).unwrap()
}

fn mount_args(args: &[&str]) -> MountArgs {
    match parse(args).command {
        Command::Mount(args) => args,
        other => panic!("expected mount, got {other:?}"),
    }
}

#[test]
fn mount_defaults() {
    let args = mount_args(&["gitfs", "mount", "/src/repo", "/mnt/repo"]);
    assert_eq!(args.repository, "/src/repo");
    assert_eq!(args.mountpoint, PathBuf::from("/mnt/repo"));
    assert_eq!(args.verbose, 0);
    assert!(!args.daemon);
    assert!(!args.allow_other);
    assert!(!args.auto_unmount);
    assert_eq!(args.ttl, None);
    assert_eq!(args.config, None);
}

#[test]
fn mount_flags() {
    let args = mount_args(&[
        "gitfs",
        "mount",
        "-vvv",
        "-d",
        "--allow-other",
        "--auto-unmount",
        "--ttl",
        "10",
        "--config",
        "/etc/gitfs.toml",
        "https://example.com/repo.git",
        "/mnt/x",
    ]);
    assert_eq!(args.verbose, 3);
    assert!(args.daemon);
    assert!(args.allow_other);
    assert!(args.auto_unmount);
    assert_eq!(args.ttl, Some(10));
    assert_eq!(args.config, Some(PathBuf::from("/etc/gitfs.toml")));
    assert_eq!(args.repository, "https://example.com/repo.git");
}

#[rstest]
#[case::no_subcommand(&["gitfs"])]
#[case::mount_missing_mountpoint(&["gitfs", "mount", "/src/repo"])]
#[case::umount_missing_mountpoint(&["gitfs", "umount"])]
#[case::unknown_subcommand(&["gitfs", "remount", "/mnt"])]
#[case::bad_ttl(&["gitfs", "mount", "--ttl", "soon", "/a", "/b"])]
fn rejected_command_lines(#[case] args: &[&str]) {
    assert!(Cli::try_parse_from(args).is_err());
}

#[test]
fn umount_and_version_parse() {
    match parse(&["gitfs", "umount", "/mnt/repo"]).command {
        Command::Umount { mountpoint } => assert_eq!(mountpoint, PathBuf::from("/mnt/repo")),
        other => panic!("expected umount, got {other:?}"),
    }
    assert!(matches!(
        parse(&["gitfs", "version"]).command,
        Command::Version
    ));
}

#[test]
fn options_fall_back_to_config() {
    let args = mount_args(&["gitfs", "mount", "/src/repo", "/mnt/repo"]);
    let config = Config {
        attr_ttl_secs: 7,
        allow_other: true,
        auto_unmount: true,
        fs_name: Some("gitfs: custom".to_string()),
        log_filter: None,
    };
    let options = mount_options(
        &args,
        &config,
        "gitfs: /src/repo/.git",
        "repo",
        Path::new("/mnt/repo"),
    );
    assert_eq!(options.ttl, Duration::from_secs(7));
    assert!(options.allow_other);
    assert!(options.auto_unmount);
    assert_eq!(options.fs_name, "gitfs: custom");
}

#[test]
fn flags_override_config() {
    let args = mount_args(&[
        "gitfs",
        "mount",
        "--ttl",
        "0",
        "--allow-other",
        "/src/repo",
        "/mnt/repo",
    ]);
    let options = mount_options(
        &args,
        &Config::default(),
        "gitfs: /src/repo/.git",
        "repo",
        Path::new("/mnt/repo"),
    );
    assert_eq!(options.ttl, Duration::ZERO);
    assert!(options.allow_other);
    assert!(!options.auto_unmount);
    assert_eq!(options.fs_name, "gitfs: /src/repo/.git");
    if cfg!(target_os = "macos") {
        assert_eq!(options.volume_name.as_deref(), Some("repo (repo)"));
    } else {
        assert_eq!(options.volume_name, None);
    }
}

#[test]
fn version_names_the_package() {
    let version = version_string();
    assert!(version.starts_with("gitfs: version "));
    assert!(version.contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn version_command_succeeds() {
    run(parse(&["gitfs", "version"])).unwrap();
}

#[test]
fn opens_local_fixture() {
    let fixture = release_fixture().unwrap();
    let opened = open_or_clone(fixture.repo.path().to_str().unwrap()).unwrap();
    assert!(!opened.is_clone());
    assert!(opened.fs_name.starts_with("gitfs: "));
}

#[test]
fn mount_rejects_missing_mountpoint() {
    let dir = tempfile::tempdir().unwrap();
    let fixture = release_fixture().unwrap();
    let missing = dir.path().join("nowhere");
    let config = dir.path().join("config.toml");
    std::fs::write(&config, "").unwrap();
    let err = run(parse(&[
        "gitfs",
        "mount",
        "--config",
        config.to_str().unwrap(),
        fixture.repo.path().to_str().unwrap(),
        missing.to_str().unwrap(),
    ]))
    .unwrap_err();
    assert!(err.to_string().contains("is not a directory"));
}
