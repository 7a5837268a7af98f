//! Topology and bucket control through the `couchbase-cli` executable
//!
//! Each trait call becomes one `couchbase-cli` invocation against the leader.
//! A non-zero exit status or an `ERROR` line in the output is reported as
//! [`Error::ExternalCall`] carrying the tool's message. An invocation that
//! outlives its timeout is killed and reported as [`Error::OperationTimeout`].

use std::{path::PathBuf, process::Command, time::Duration};

use cbscale_common::{
    constants::{ADMIN_PORT, CLI_TIMEOUT, OPERATION_TIMEOUT},
    ServiceSet,
};
use log::debug;

use crate::{
    control::{BucketController, BucketSpec, TopologyController, UserSpec},
    error::{Error, Result},
    http_client::QueryServiceClient,
    process::run_with_timeout,
};

#[derive(Debug, Clone)]
pub struct CouchbaseCli {
    program: PathBuf,
    endpoint: String,
    username: String,
    password: String,
    timeout: Duration,
    query: QueryServiceClient,
}

impl CouchbaseCli {
    /// Control the cluster whose leader is reachable at `endpoint`
    #[must_use]
    pub fn new(
        endpoint: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        let endpoint = endpoint.into();
        let username = username.into();
        let password = password.into();
        Self {
            program: PathBuf::from("couchbase-cli"),
            query: QueryServiceClient::new(endpoint.clone(), username.clone(), password.clone()),
            endpoint,
            username,
            password,
            timeout: CLI_TIMEOUT,
        }
    }

    /// Use a different executable, e.g. an absolute path to `couchbase-cli`
    #[must_use]
    pub fn with_program(mut self, program: impl Into<PathBuf>) -> Self {
        self.program = program.into();
        self
    }

    /// Bound every invocation by `timeout` instead of [`CLI_TIMEOUT`]
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    #[must_use]
    pub fn cluster_url(&self) -> String {
        format!("couchbase://{}", self.endpoint)
    }

    /// Full argument list for a subcommand. `cluster-init` takes the new
    /// administrator credentials instead of the login ones.
    fn command_args(&self, subcommand: &str, args: &[String]) -> Vec<String> {
        let mut argv = vec![
            subcommand.to_string(),
            "-c".to_string(),
            self.cluster_url(),
        ];
        if subcommand == "cluster-init" {
            argv.extend([
                "--cluster-username".to_string(),
                self.username.clone(),
                "--cluster-password".to_string(),
                self.password.clone(),
            ]);
        } else {
            argv.extend([
                "--username".to_string(),
                self.username.clone(),
                "--password".to_string(),
                self.password.clone(),
            ]);
        }
        argv.extend(args.iter().cloned());
        argv
    }

    fn run(&self, subcommand: &str, args: &[String]) -> Result<String> {
        let argv = self.command_args(subcommand, args);
        debug!("{} {} ...", self.program.display(), subcommand);

        let output = run_with_timeout(
            Command::new(&self.program).args(&argv),
            subcommand,
            self.timeout,
        )?;

        let stdout = output.stdout.trim().to_string();
        let stderr = output.stderr.trim().to_string();
        let reported_error = stdout.lines().chain(stderr.lines()).any(|l| l.starts_with("ERROR"));

        if !output.status.success() || reported_error {
            let message = [stdout.as_str(), stderr.as_str()]
                .iter()
                .filter(|s| !s.is_empty())
                .copied()
                .collect::<Vec<_>>()
                .join("\n");
            debug!("{subcommand} exited with {}", output.status);
            return Err(Error::external(subcommand, message));
        }

        Ok(stdout)
    }
}

fn args<const N: usize>(items: [&str; N]) -> Vec<String> {
    items.iter().map(|s| (*s).to_string()).collect()
}

fn bucket_args(bucket: &BucketSpec) -> Vec<String> {
    args([
        "--bucket",
        &bucket.name,
        "--durability-min-level",
        "none",
        "--bucket-ramsize",
        &bucket.ram_quota_mb.to_string(),
        "--bucket-replica",
        &bucket.replicas.to_string(),
        "--enable-flush",
        "1",
    ])
}

impl TopologyController for CouchbaseCli {
    fn init(&mut self, services: &ServiceSet) -> Result<String> {
        self.run("cluster-init", &args(["--services", &services.to_string()]))
    }

    fn add_node(&mut self, address: &str, services: &ServiceSet) -> Result<String> {
        let server = format!("http://{address}:{ADMIN_PORT}");
        let (username, password) = (self.username.clone(), self.password.clone());
        self.run(
            "server-add",
            &args([
                "--server-add",
                &server,
                "--server-add-username",
                &username,
                "--server-add-password",
                &password,
                "--services",
                &services.to_string(),
            ]),
        )
    }

    fn remove_node(&mut self, address: &str) -> Result<String> {
        self.run("rebalance", &args(["--server-remove", address]))
    }

    fn rebalance(&mut self) -> Result<String> {
        self.run("rebalance", &[])
    }

    fn set_alternate_address(&mut self, node: &str, public_address: &str) -> Result<String> {
        self.run(
            "setting-alternate-address",
            &args(["--node", node, "--set", "--hostname", public_address]),
        )
    }

    fn retarget(&mut self, endpoint: &str) {
        debug!("Control plane now targets {endpoint}");
        self.endpoint = endpoint.to_string();
        self.query =
            QueryServiceClient::new(endpoint, self.username.clone(), self.password.clone());
    }
}

impl BucketController for CouchbaseCli {
    fn create_bucket(&mut self, bucket: &BucketSpec) -> Result<String> {
        let mut argv = bucket_args(bucket);
        argv.extend(args([
            "--bucket-type",
            "couchbase",
            "--conflict-resolution",
            "sequence",
            "--wait",
        ]));
        self.run("bucket-create", &argv)
    }

    fn edit_bucket(&mut self, bucket: &BucketSpec) -> Result<String> {
        self.run("bucket-edit", &bucket_args(bucket))
    }

    fn flush_bucket(&mut self, name: &str) -> Result<String> {
        self.run("bucket-flush", &args(["--bucket", name, "--force"]))
    }

    fn create_scope(&mut self, bucket: &str, scope: &str) -> Result<String> {
        self.run(
            "collection-manage",
            &args(["--bucket", bucket, "--create-scope", scope]),
        )
    }

    fn create_collection(&mut self, bucket: &str, scope: &str, name: &str) -> Result<String> {
        let qualified = format!("{scope}.{name}");
        self.run(
            "collection-manage",
            &args(["--bucket", bucket, "--create-collection", &qualified]),
        )
    }

    fn create_primary_index(&mut self, bucket: &str) -> Result<String> {
        self.query.create_primary_index(bucket, OPERATION_TIMEOUT)
    }

    fn create_user(&mut self, user: &UserSpec) -> Result<String> {
        let roles = format!("{}[{}]", user.role, user.bucket);
        self.run(
            "user-manage",
            &args([
                "--set",
                "--rbac-username",
                &user.username,
                "--rbac-password",
                &user.password,
                "--roles",
                &roles,
                "--auth-domain",
                "local",
            ]),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cli() -> CouchbaseCli {
        CouchbaseCli::new("54.0.0.1", "admin", "secret")
    }

    #[test]
    fn test_login_arguments() {
        let argv = cli().command_args("rebalance", &args(["--server-remove", "10.0.0.2"]));
        assert_eq!(
            argv,
            vec![
                "rebalance",
                "-c",
                "couchbase://54.0.0.1",
                "--username",
                "admin",
                "--password",
                "secret",
                "--server-remove",
                "10.0.0.2"
            ]
        );
    }

    #[test]
    fn test_cluster_init_uses_cluster_credentials() {
        let argv = cli().command_args("cluster-init", &args(["--services", "data"]));
        assert!(argv.contains(&"--cluster-username".to_string()));
        assert!(!argv.contains(&"--username".to_string()));
    }

    #[test]
    fn test_retarget_moves_every_call() {
        let mut cli = cli();
        cli.retarget("h0.internal");
        assert_eq!(cli.cluster_url(), "couchbase://h0.internal");
        assert_eq!(cli.query.host(), "h0.internal");
    }

    #[test]
    fn test_bucket_arguments() {
        let argv = bucket_args(&BucketSpec {
            name: "small-bucket".to_string(),
            ram_quota_mb: 1024,
            replicas: 1,
        });
        let joined = argv.join(" ");
        assert!(joined.contains("--bucket small-bucket"));
        assert!(joined.contains("--bucket-ramsize 1024"));
        assert!(joined.contains("--bucket-replica 1"));
    }

    #[cfg(unix)]
    #[test]
    fn test_run_reports_output() {
        let mut echo = cli().with_program("echo");
        let output = echo.flush_bucket("small-bucket").unwrap();
        assert!(output.starts_with("bucket-flush -c couchbase://54.0.0.1"));
        assert!(output.ends_with("--bucket small-bucket --force"));
    }

    #[cfg(unix)]
    #[test]
    fn test_run_failure_is_external_call_error() {
        let mut failing = cli().with_program("false");
        let err = failing.rebalance().unwrap_err();
        assert!(matches!(err, Error::ExternalCall { ref command, .. } if command == "rebalance"));
    }

    #[cfg(unix)]
    #[test]
    fn test_hung_rebalance_times_out() {
        // `sleep` rejects the login arguments, so wrap it to ignore them.
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("couchbase-cli");
        std::fs::write(&script, "#!/bin/sh\nexec sleep 30\n").unwrap();
        let mut perms = std::fs::metadata(&script).unwrap().permissions();
        std::os::unix::fs::PermissionsExt::set_mode(&mut perms, 0o755);
        std::fs::set_permissions(&script, perms).unwrap();

        let mut hung = cli()
            .with_program(&script)
            .with_timeout(Duration::from_millis(300));
        let err = hung.rebalance().unwrap_err();
        assert!(err.is_timeout());
        assert!(matches!(err, Error::OperationTimeout { ref operation, .. } if operation == "rebalance"));
    }

    #[test]
    fn test_missing_program_is_external_call_error() {
        let mut missing = cli().with_program("/nonexistent/couchbase-cli");
        assert!(matches!(
            missing.rebalance(),
            Err(Error::ExternalCall { .. })
        ));
    }
}
