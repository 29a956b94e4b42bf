use anyhow::{bail, Context, Result};
use tokio::process::Command;
use tracing::{debug, info};

/// Subcommands of the goose CLI used by this workspace
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GooseCommand {
    Up,
    Down,
    Status,
}

impl GooseCommand {
    fn as_arg(&self) -> &'static str {
        match self {
            GooseCommand::Up => "up",
            GooseCommand::Down => "down",
            GooseCommand::Status => "status",
        }
    }
}

/// Runs SQL migrations by spawning the goose binary.
///
/// The runner is driver-agnostic; the telemetry service uses it with the
/// `postgres` driver against `crates/common/migrations/postgres`.
pub struct MigrationRunner {
    /// Path to the goose binary (e.g., "goose" if in PATH, or absolute path)
    goose_binary_path: String,

    /// Directory containing SQL migration files
    migrations_dir: String,

    /// Database driver name (e.g., "postgres")
    driver: String,

    /// Database connection string (DSN) - format depends on the driver
    dsn: String,
}

impl MigrationRunner {
    pub fn new(
        goose_binary_path: String,
        migrations_dir: String,
        driver: String,
        dsn: String,
    ) -> Self {
        Self {
            goose_binary_path,
            migrations_dir,
            driver,
            dsn,
        }
    }

    /// Arguments passed to goose for `command`, excluding the binary itself
    fn args(&self, command: GooseCommand) -> [&str; 5] {
        [
            "-dir",
            &self.migrations_dir,
            &self.driver,
            &self.dsn,
            command.as_arg(),
        ]
    }

    async fn run(&self, command: GooseCommand) -> Result<String> {
        let output = Command::new(&self.goose_binary_path)
            .args(self.args(command))
            .output()
            .await
            .with_context(|| format!("failed to spawn goose at {}", self.goose_binary_path))?;

        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            bail!(
                "goose {} failed.\nstdout: {}\nstderr: {}",
                command.as_arg(),
                stdout,
                stderr
            );
        }

        Ok(stdout)
    }

    /// Applies all pending migrations
    pub async fn run_migrations(&self) -> Result<()> {
        debug!("running migrations from directory: {}", self.migrations_dir);
        let stdout = self.run(GooseCommand::Up).await?;
        info!(migrations_dir = %self.migrations_dir, "migrations applied");
        debug!("goose output:\n{}", stdout);
        Ok(())
    }

    /// Rolls back the most recent migration
    pub async fn rollback_migration(&self) -> Result<()> {
        debug!("rolling back most recent migration");
        self.run(GooseCommand::Down).await?;
        Ok(())
    }

    /// Returns goose's status report
    pub async fn migration_status(&self) -> Result<String> {
        self.run(GooseCommand::Status).await
    }
}
