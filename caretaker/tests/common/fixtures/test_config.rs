//! Test configuration builder for creating test configs programmatically

use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

/// Builder for creating test configurations
pub struct TestConfigBuilder {
    temp_dir: TempDir,
    main_config: MainConfigBuilder,
    task_files: Vec<(String, String)>,
}

impl TestConfigBuilder {
    /// Create a new test config builder
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let main_config = MainConfigBuilder::rooted_at(temp_dir.path());
        Self {
            temp_dir,
            main_config,
            task_files: Vec::new(),
        }
    }

    /// Configure main settings
    pub fn with_main_config<F>(mut self, f: F) -> Self
    where
        F: FnOnce(MainConfigBuilder) -> MainConfigBuilder,
    {
        self.main_config = f(self.main_config);
        self
    }

    /// Add a task file (`<name>.toml`) with raw TOML content
    pub fn with_task_file(mut self, name: &str, content: &str) -> Self {
        self.task_files
            .push((name.to_string(), content.to_string()));
        self
    }

    /// Build and write config files to temp directory
    pub fn build(self) -> TestConfig {
        let config_dir = self.temp_dir.path().join("config");
        fs::create_dir_all(&config_dir).expect("Failed to create config dir");

        fs::write(config_dir.join("main.toml"), self.main_config.to_toml())
            .expect("Failed to write main.toml");

        for (name, content) in self.task_files {
            fs::write(config_dir.join(format!("{}.toml", name)), content)
                .expect("Failed to write task file");
        }

        TestConfig {
            data_root: self.temp_dir.path().to_path_buf(),
            _temp_dir: self.temp_dir,
            config_dir,
        }
    }
}

impl Default for TestConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Main configuration builder
#[derive(Clone)]
pub struct MainConfigBuilder {
    host: String,
    port: u16,
    data_dir: String,
    database_path: String,
    alert_log_path: String,
    timezone: String,
    alarm_webhook_url: Option<String>,
    retention: Vec<(String, u32)>,
    deploy_branches: Vec<String>,
}

impl MainConfigBuilder {
    fn rooted_at(root: &std::path::Path) -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 18095,
            data_dir: root.join("artifacts").display().to_string(),
            database_path: root.join("caretaker.db").display().to_string(),
            alert_log_path: root.join("alerts.log").display().to_string(),
            timezone: "UTC".to_string(),
            alarm_webhook_url: None,
            retention: Vec::new(),
            deploy_branches: vec!["main".to_string()],
        }
    }

    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn timezone(mut self, timezone: &str) -> Self {
        self.timezone = timezone.to_string();
        self
    }

    pub fn in_memory_database(mut self) -> Self {
        self.database_path = ":memory:".to_string();
        self
    }

    pub fn webhook(mut self, url: &str) -> Self {
        self.alarm_webhook_url = Some(url.to_string());
        self
    }

    pub fn retention(mut self, category: &str, days: u32) -> Self {
        self.retention.push((category.to_string(), days));
        self
    }

    pub fn deploy_branches(mut self, branches: &[&str]) -> Self {
        self.deploy_branches = branches.iter().map(|b| b.to_string()).collect();
        self
    }

    fn to_toml(&self) -> String {
        let mut toml = format!(
            r#"host = "{}"
port = {}
data_dir = "{}"
database_path = "{}"
alert_log_path = "{}"
timezone = "{}"
tracing_sink_enabled = false
deploy_branches = [{}]
"#,
            self.host,
            self.port,
            self.data_dir,
            self.database_path,
            self.alert_log_path,
            self.timezone,
            self.deploy_branches
                .iter()
                .map(|b| format!("\"{}\"", b))
                .collect::<Vec<_>>()
                .join(", ")
        );

        if let Some(url) = &self.alarm_webhook_url {
            toml.push_str(&format!("alarm_webhook_url = \"{}\"\n", url));
        }

        if !self.retention.is_empty() {
            toml.push_str("\n[retention]\n");
            for (category, days) in &self.retention {
                toml.push_str(&format!("{} = {}\n", category, days));
            }
        }

        toml
    }
}

/// Test configuration with temporary directory
pub struct TestConfig {
    _temp_dir: TempDir,
    pub config_dir: PathBuf,
    /// Directory data paths in main.toml point into
    pub data_root: PathBuf,
}

/// A backup task file with one source per `(label, command)`
pub fn backup_task_toml(id: &str, category: &str, sources: &[(&str, &str)]) -> String {
    let mut toml = format!(
        r#"[[backups]]
id = "{}"
category = "{}"
"#,
        id, category
    );
    if sources.is_empty() {
        toml.push_str("sources = []\n");
    }
    for (label, command) in sources {
        toml.push_str(&format!(
            r#"
[[backups.sources]]
label = "{}"
command = "{}"
"#,
            label, command
        ));
    }
    toml
}

/// The four-stage deploy pipeline used throughout the tests
pub fn deploy_pipeline_toml(name: &str) -> String {
    format!(
        r#"[[pipelines]]
name = "{name}"
environment = "staging"
playbook = "site.yml"

[[pipelines.stages]]
name = "lint"
command = "ansible-lint {{playbook}}"
blocking = false

[[pipelines.stages]]
name = "syntax"
command = "ansible-playbook --syntax-check {{playbook}}"

[[pipelines.stages]]
name = "deploy"
command = "ansible-playbook -i inventories/{{environment}} {{playbook}}"
gated = true

[[pipelines.stages]]
name = "notify"
command = "notify-send {{pipeline}} {{ref}}"
"#
    )
}
