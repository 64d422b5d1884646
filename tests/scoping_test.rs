//! Credentials registered for a job only serve URLs beneath their scope, and
//! the global store backs every job.

use anyhow::Result;
use credscope::{AuthenticationManager, CredentialSubmission, Resolution, Resolver, Secret, Submission};
use credscope_test_utils::{FakeRepositoryServer, StoreRootGuard, job, url};

fn submit(
  resolver: &Resolver,
  server: &FakeRepositoryServer,
  job_name: Option<&str>,
  location: &str,
  username: &str,
  password: &str,
) -> Result<Submission> {
  let submission = CredentialSubmission {
    job: job_name.map(job),
    url: url(location),
    secret: Secret::password(username, password),
  };
  Ok(resolver.post_credential(submission, server)?)
}

#[test]
fn test_job_credential_only_serves_its_scope() -> Result<()> {
  let guard = StoreRootGuard::new();
  let server = FakeRepositoryServer::new("svn://localhost").with_user("harry", "harryssecret", &[]);
  let resolver = guard.resolver();
  let assembly = job("assembly");

  let outcome = submit(&resolver, &server, Some("assembly"), "svn://localhost/assembly", "harry", "harryssecret")?;
  assert!(matches!(outcome, Submission::Stored { .. }));

  let auth = resolver.authentication_manager(Some(assembly.clone()));
  assert!(server.checkout(&url("svn://localhost/assembly"), &auth).is_ok());
  assert!(server.checkout(&url("svn://localhost/assembly/trunk"), &auth).is_ok());
  assert!(server.checkout(&url("svn://localhost/other"), &auth).is_err());

  let resolution = resolver.resolve(Some(&assembly), server.realm(), &url("svn://localhost/assembly"));
  assert!(matches!(resolution, Resolution::Job { .. }));
  assert_eq!(
    resolution.record().map(|record| record.secret.clone()),
    Some(Secret::password("harry", "harryssecret"))
  );
  assert!(
    resolver
      .resolve(Some(&assembly), server.realm(), &url("svn://localhost/other"))
      .is_unknown()
  );

  Ok(())
}

#[test]
fn test_jobs_are_isolated_until_a_global_credential_exists() -> Result<()> {
  let guard = StoreRootGuard::new();
  let server = FakeRepositoryServer::new("svn://localhost")
    .with_user("bob", "bobssecret", &["svn://localhost/bob"])
    .with_user("charlie", "charliessecret", &["svn://localhost/charlie"])
    .with_user("alice", "alicessecret", &[]);
  let resolver = guard.resolver();
  let (bob, charlie) = (job("bob"), job("charlie"));
  let (bob_url, charlie_url) = (url("svn://localhost/bob"), url("svn://localhost/charlie"));

  submit(&resolver, &server, Some("charlie"), "svn://localhost/charlie", "charlie", "charliessecret")?;
  assert!(server.checkout(&bob_url, &resolver.authentication_manager(Some(bob.clone()))).is_err());
  assert!(server.checkout(&charlie_url, &resolver.authentication_manager(Some(charlie.clone()))).is_ok());

  submit(&resolver, &server, Some("bob"), "svn://localhost/bob", "bob", "bobssecret")?;
  assert!(server.checkout(&bob_url, &resolver.authentication_manager(Some(bob.clone()))).is_ok());
  // Charlie's job has no credential for bob's repository
  assert!(server.checkout(&bob_url, &resolver.authentication_manager(Some(charlie.clone()))).is_err());

  let fresh = StoreRootGuard::new();
  let resolver = fresh.resolver();
  submit(&resolver, &server, None, "svn://localhost", "alice", "alicessecret")?;
  assert!(server.checkout(&bob_url, &resolver.authentication_manager(Some(bob))).is_ok());
  assert!(server.checkout(&charlie_url, &resolver.authentication_manager(Some(charlie))).is_ok());
  assert!(!fresh.persisted_global().is_empty());

  Ok(())
}

#[test]
fn test_parent_scope_authorizes_externals() -> Result<()> {
  let guard = StoreRootGuard::new();
  let server = FakeRepositoryServer::new("svn://localhost").with_user("harry", "harryssecret", &[]);
  let resolver = guard.resolver();

  let url1 = url("svn://localhost/repo/assembly");
  let url2 = url("svn://localhost/repo");
  let url3 = url("svn://localhost/repo/package/trunk");

  // Stored against the repository root, the credential reaches the external
  submit(&resolver, &server, Some("with-externals"), "svn://localhost/repo", "harry", "harryssecret")?;
  let auth = resolver.authentication_manager(Some(job("with-externals")));
  assert!(server.checkout_all(&[url1.clone(), url3.clone()], &auth).is_ok());
  assert!(server.checkout(&url2, &auth).is_ok());

  // Stored against the assembly only, the external is out of scope
  submit(&resolver, &server, Some("assembly-only"), "svn://localhost/repo/assembly", "harry", "harryssecret")?;
  let auth = resolver.authentication_manager(Some(job("assembly-only")));
  assert!(server.checkout(&url1, &auth).is_ok());
  assert!(server.checkout_all(&[url1, url3], &auth).is_err());

  Ok(())
}

#[test]
fn test_credentials_survive_restart() -> Result<()> {
  let guard = StoreRootGuard::new();
  let server = FakeRepositoryServer::new("svn://localhost").with_user("harry", "harryssecret", &[]);
  let assembly = job("assembly");

  submit(&guard.resolver(), &server, Some("assembly"), "svn://localhost/assembly", "harry", "harryssecret")?;

  let restarted = guard.resolver();
  let auth = restarted.authentication_manager(Some(assembly.clone()));
  assert!(server.checkout(&url("svn://localhost/assembly/trunk"), &auth).is_ok());
  assert_eq!(restarted.stores(&assembly).len(), 1);

  Ok(())
}

#[test]
fn test_matrix_configuration_has_its_own_directory() -> Result<()> {
  let guard = StoreRootGuard::new();
  let server = FakeRepositoryServer::new("svn://localhost").with_user("harry", "harryssecret", &[]);
  let configuration = job("matrix").configuration(&[("db", "mysql")])?;
  let location = url("svn://localhost/matrix");

  let resolver = guard.resolver();
  resolver.post_credential(
    CredentialSubmission {
      job: Some(configuration.clone()),
      url: location.clone(),
      secret: Secret::password("harry", "harryssecret"),
    },
    &server,
  )?;

  let scopes_dir = guard
    .root()
    .join("jobs")
    .join("matrix")
    .join("configurations")
    .join("axis-db")
    .join("mysql")
    .join("scopes");
  assert!(scopes_dir.is_dir());
  assert!(!guard.persisted_store(&configuration, "svn://localhost/matrix").is_empty());

  // The parent job does not inherit the configuration's credential
  assert!(
    guard
      .resolver()
      .resolve(Some(&job("matrix")), server.realm(), &location)
      .is_unknown()
  );

  Ok(())
}

#[test]
fn test_failed_authentication_never_deletes() -> Result<()> {
  let guard = StoreRootGuard::new();
  let server = FakeRepositoryServer::new("svn://localhost").with_user("harry", "harryssecret", &[]);
  let assembly = job("assembly");
  let location = url("svn://localhost/assembly");

  let resolver = guard.resolver();
  submit(&resolver, &server, Some("assembly"), "svn://localhost/assembly", "harry", "harryssecret")?;

  let auth = resolver.authentication_manager(Some(assembly.clone()));
  auth.acknowledge_authentication(false, server.realm(), &location, None);
  auth.acknowledge_authentication(false, server.realm(), &location, Some(&Secret::password("harry", "wrong")));

  assert!(!guard.persisted_store(&assembly, "svn://localhost/assembly").is_empty());
  assert!(server.checkout(&location, &auth).is_ok());

  Ok(())
}
