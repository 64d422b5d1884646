use std::{fs, str};

use anyhow::Result;
use assert_cmd::cargo::cargo_bin_cmd;
use credscope_core::{HandoffSnapshot, Secret};
use credscope_test_utils::{StoreRootGuard, job, url};
use predicates::prelude::*;

const REALM: &str = "<svn://localhost:3690>";

/// Store harry's credential for the assembly job and alice's globally
fn seed(guard: &StoreRootGuard) {
  let resolver = guard.resolver();
  resolver.acknowledge(
    Some(&job("assembly")),
    true,
    REALM,
    &url("svn://localhost/repo/assembly"),
    Some(&Secret::password("harry", "harryssecret")),
  );
  resolver.acknowledge(
    None,
    true,
    REALM,
    &url("svn://localhost/repo"),
    Some(&Secret::password("alice", "alicessecret")),
  );
}

fn credscope(guard: &StoreRootGuard) -> assert_cmd::Command {
  let mut cmd = cargo_bin_cmd!("credscope");
  cmd.env("CREDSCOPE_HOME", guard.root()).env("NO_COLOR", "1");
  cmd
}

#[test]
fn help_lists_commands() {
  cargo_bin_cmd!("credscope")
    .arg("--help")
    .assert()
    .success()
    .stdout(predicate::str::contains("resolve"))
    .stdout(predicate::str::contains("export"))
    .stdout(predicate::str::contains("import"));
}

#[test]
fn locate_prints_global_store_path() {
  let guard = StoreRootGuard::new();
  let expected = guard.path("global").join("credentials.json");

  credscope(&guard)
    .arg("locate")
    .assert()
    .success()
    .stdout(predicate::str::contains(expected.display().to_string()));
}

#[test]
fn locate_lists_stored_scopes_of_a_job() {
  let guard = StoreRootGuard::new();
  seed(&guard);

  credscope(&guard)
    .args(["locate", "--job", "assembly"])
    .assert()
    .success()
    .stdout(predicate::str::contains("svn://localhost/repo/assembly"));
}

#[test]
fn locate_warns_when_job_has_no_scopes() {
  let guard = StoreRootGuard::new();

  credscope(&guard)
    .args(["locate", "--job", "nothing-here"])
    .assert()
    .success()
    .stdout(predicate::str::contains("No stored scopes for job nothing-here"));
}

#[test]
fn list_masks_secrets() -> Result<()> {
  let guard = StoreRootGuard::new();
  seed(&guard);

  let assert = credscope(&guard).args(["list", "--job", "assembly"]).assert().success();
  let stdout = str::from_utf8(&assert.get_output().stdout)?;
  assert!(stdout.contains("Credentials for job assembly"));
  assert!(stdout.contains("harry:harr****cret"));
  assert!(!stdout.contains("harryssecret"));

  let assert = credscope(&guard).arg("ls").assert().success();
  let stdout = str::from_utf8(&assert.get_output().stdout)?;
  assert!(stdout.contains("Global credentials"));
  assert!(stdout.contains("alice:alic****cret"));
  assert!(!stdout.contains("alicessecret"));

  Ok(())
}

#[test]
fn list_warns_when_empty() {
  let guard = StoreRootGuard::new();

  credscope(&guard)
    .args(["list", "--job", "assembly"])
    .assert()
    .success()
    .stdout(predicate::str::contains("Credentials for job assembly: none stored"));
}

#[test]
fn axis_requires_job() {
  let guard = StoreRootGuard::new();

  credscope(&guard).args(["list", "--axis", "db=mysql"]).assert().failure();
}

#[test]
fn resolve_prefers_job_store() {
  let guard = StoreRootGuard::new();
  seed(&guard);

  credscope(&guard)
    .args(["resolve", "--job", "assembly", "--realm", REALM, "svn://localhost/repo/assembly/trunk"])
    .assert()
    .success()
    .stdout(predicate::str::contains("Job store svn://localhost/repo/assembly answers"))
    .stdout(predicate::str::contains("credential: harry:harr****cret"));
}

#[test]
fn resolve_falls_back_to_global_store() {
  let guard = StoreRootGuard::new();
  seed(&guard);

  credscope(&guard)
    .args(["resolve", "--job", "assembly", "--realm", REALM, "svn://localhost/repo/package/trunk"])
    .assert()
    .success()
    .stdout(predicate::str::contains("Global store answers"))
    .stdout(predicate::str::contains("credential: alice:alic****cret"));
}

#[test]
fn resolve_reports_unknown_realm() {
  let guard = StoreRootGuard::new();
  seed(&guard);

  credscope(&guard)
    .args(["resolve", "--realm", "<svn://elsewhere:3690>", "svn://elsewhere/repo"])
    .assert()
    .success()
    .stdout(predicate::str::contains("No stored credential for <svn://elsewhere:3690>"));
}

#[test]
fn resolve_rejects_invalid_url() {
  let guard = StoreRootGuard::new();

  credscope(&guard)
    .args(["resolve", "--realm", REALM, "not a url"])
    .assert()
    .failure()
    .stderr(predicate::str::contains("Invalid repository URL"));
}

#[test]
fn export_requires_repository_urls() {
  let guard = StoreRootGuard::new();

  credscope(&guard)
    .args(["export", "--job", "assembly"])
    .assert()
    .failure()
    .stderr(predicate::str::contains("No repository URLs given"));
}

#[test]
fn export_writes_snapshot_to_stdout() -> Result<()> {
  let guard = StoreRootGuard::new();
  seed(&guard);

  let assert = credscope(&guard)
    .args(["export", "--job", "assembly", "--url", "svn://localhost/repo/assembly/trunk"])
    .assert()
    .success();

  let snapshot = HandoffSnapshot::decode(str::from_utf8(&assert.get_output().stdout)?)?;
  assert_eq!(snapshot.job(), &job("assembly"));
  assert_eq!(snapshot.scopes().len(), 1);
  assert_eq!(snapshot.global().len(), 1);

  Ok(())
}

#[test]
fn export_reads_locations_from_scm_settings() -> Result<()> {
  let guard = StoreRootGuard::new();
  seed(&guard);

  let scm = guard.path("scm.toml");
  fs::write(
    &scm,
    "[[locations]]\nremote = \"svn://localhost/repo/package/trunk\"\n",
  )?;
  let output = guard.path("snapshot.json");

  credscope(&guard)
    .args(["export", "--job", "assembly", "--scm"])
    .arg(&scm)
    .arg("-o")
    .arg(&output)
    .assert()
    .success()
    .stdout(predicate::str::contains("Wrote 1 credential(s) for job assembly"));

  // The assembly store does not authorize package/trunk
  let snapshot = HandoffSnapshot::decode(&fs::read_to_string(&output)?)?;
  assert!(snapshot.scopes().is_empty());
  assert_eq!(snapshot.global().len(), 1);

  #[cfg(unix)]
  {
    use std::os::unix::fs::PermissionsExt;
    assert_eq!(fs::metadata(&output)?.permissions().mode() & 0o777, 0o600);
  }

  Ok(())
}

#[test]
fn import_merges_worker_credentials() -> Result<()> {
  let guard = StoreRootGuard::new();
  seed(&guard);
  let assembly = job("assembly");
  let package = url("svn://localhost/repo/package/trunk");

  let exported = guard.resolver().snapshot_for(&assembly, &[package.clone()]);
  let worker = exported.restore()?;
  worker.acknowledge(
    Some(&assembly),
    true,
    REALM,
    &package,
    Some(&Secret::password("packager", "packagerssecret")),
  );
  let returned = guard.path("returned.json");
  fs::write(&returned, worker.returned_snapshot(&assembly).encode()?)?;

  credscope(&guard)
    .args(["import", "--job", "assembly"])
    .arg(&returned)
    .assert()
    .success()
    .stdout(predicate::str::contains("Absorbed 1 credential(s) for job assembly"));

  let store = guard.persisted_store(&assembly, "svn://localhost/repo/package/trunk");
  assert_eq!(store.get(REALM).map(|r| r.secret.clone()), Some(Secret::password("packager", "packagerssecret")));

  // A second import changes nothing
  credscope(&guard)
    .args(["import", "--job", "assembly"])
    .arg(&returned)
    .assert()
    .success()
    .stdout(predicate::str::contains("Nothing new for job assembly"));

  Ok(())
}

#[test]
fn import_rejects_snapshot_of_another_job() -> Result<()> {
  let guard = StoreRootGuard::new();
  let snapshot = guard.resolver().snapshot_for(&job("other"), &[url("svn://localhost/repo")]);
  let file = guard.path("other.json");
  fs::write(&file, snapshot.encode()?)?;

  credscope(&guard)
    .args(["import", "--job", "assembly"])
    .arg(&file)
    .assert()
    .failure();

  Ok(())
}

#[test]
fn import_reports_stores_it_cannot_persist() -> Result<()> {
  let guard = StoreRootGuard::new();
  let assembly = job("assembly");
  let package = url("svn://localhost/repo/package/trunk");

  let worker = guard.resolver().snapshot_for(&assembly, &[package.clone()]).restore()?;
  worker.acknowledge(
    Some(&assembly),
    true,
    REALM,
    &package,
    Some(&Secret::password("packager", "packagerssecret")),
  );
  let returned = guard.path("returned.json");
  fs::write(&returned, worker.returned_snapshot(&assembly).encode()?)?;

  // A plain file where the storage root should be
  let blocked = guard.path("blocked");
  fs::write(&blocked, "")?;

  cargo_bin_cmd!("credscope")
    .env("CREDSCOPE_HOME", &blocked)
    .env("NO_COLOR", "1")
    .args(["import", "--job", "assembly"])
    .arg(&returned)
    .assert()
    .success()
    .stderr(predicate::str::contains("Could not persist"))
    .stdout(predicate::str::contains("Absorbed 1 credential(s) for job assembly"));

  Ok(())
}
