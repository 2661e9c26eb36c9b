//! Run driver: resolves settings, loads the inputs, wires one dispatcher per
//! host and hands everything to the replicator

use crate::cli::args::Args;
use crate::config::{HostTarget, RunConfig};
use crate::error::{ReplicationError, Result};
use crate::loader::{self, RunConfigFile};
use crate::logging::Logger;
use crate::model::Organization;
use crate::registry::{Dispatcher, DispatcherStats, HttpTransport, ReqwestTransport};
use crate::replication::{Replicator, SourceIntrospector};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Settings after CLI flags, environment and run-config file are merged
#[derive(Debug, Clone)]
pub struct Settings {
    pub config: RunConfig,
    pub quays_file: Option<PathBuf>,
    pub repo_files: Vec<PathBuf>,
    /// Run-config file path when it was found and applied
    pub conf_file: Option<PathBuf>,
}

impl Settings {
    /// CLI flags, overlaid by the environment, overlaid by the run-config file
    pub fn resolve(args: &Args) -> Result<Self> {
        let mut settings = Self {
            config: args.run_config().from_env(),
            quays_file: args.quays_file.clone(),
            repo_files: args.repo.clone(),
            conf_file: None,
        };

        if let Some(file) = loader::load_run_config(&args.conf)? {
            settings.apply(file);
            settings.conf_file = Some(args.conf.clone());
        }

        settings.config.validate()?;
        Ok(settings)
    }

    fn apply(&mut self, file: RunConfigFile) {
        if file.quays_file.is_some() {
            self.quays_file = file.quays_file;
        }
        if !file.repo_files.is_empty() {
            self.repo_files = file.repo_files;
        }

        let params = file.params;
        if let Some(ms) = params.sleep {
            self.config.sleep_period = Duration::from_millis(ms);
        }
        if let Some(retries) = params.retries {
            self.config.retries = retries;
        }
        if let Some(debug) = params.debug {
            self.config.debug = debug;
        }
        if let Some(ldapsync) = params.ldapsync {
            self.config.ldap_sync = ldapsync;
        }
        if let Some(dryrun) = params.dryrun {
            self.config.dry_run = dryrun;
        }
        if let Some(clone) = params.clone {
            self.config.clone = clone;
        }
    }
}

/// Outcome of a completed run
#[derive(Debug, Clone)]
pub struct RunReport {
    pub organizations: usize,
    /// Clone source, when the run read one
    pub source: Option<DispatcherStats>,
    pub hosts: Vec<DispatcherStats>,
    pub elapsed: Duration,
}

impl RunReport {
    pub fn failed_actions(&self) -> u64 {
        self.source
            .iter()
            .chain(&self.hosts)
            .map(|h| h.failed_actions)
            .sum()
    }

    pub fn succeeded(&self) -> bool {
        self.failed_actions() == 0
    }
}

pub struct Runner {
    settings: Settings,
    output: Logger,
    transport: Option<Arc<dyn HttpTransport>>,
}

impl Runner {
    pub fn new(args: Args) -> Result<Self> {
        args.validate().map_err(ReplicationError::Configuration)?;
        let settings = Settings::resolve(&args)?;
        Ok(Self::from_settings(settings))
    }

    pub fn from_settings(settings: Settings) -> Self {
        let output = Logger::new(settings.config.debug);
        Self {
            settings,
            output,
            transport: None,
        }
    }

    /// Use `transport` instead of a real HTTP client for every host
    pub fn with_transport(mut self, transport: Arc<dyn HttpTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub async fn run(&self) -> Result<RunReport> {
        let config = &self.settings.config;

        self.output.section("Quay Replication");
        match &self.settings.conf_file {
            Some(path) => self
                .output
                .info(&format!("Run configuration loaded from {}", path.display())),
            None => self
                .output
                .warning("Run configuration file not found, using command-line options"),
        }
        if config.dry_run {
            self.output.info("Dry run mode - no changes will be made");
        }

        let mut hosts = self.load_hosts()?;

        // Declarative input is checked before anything touches the network.
        let declared = if config.clone {
            None
        } else {
            Some(self.load_organizations()?)
        };

        let transport = match &self.transport {
            Some(transport) => Arc::clone(transport),
            None => Arc::new(ReqwestTransport::new(config)?) as Arc<dyn HttpTransport>,
        };

        let (organizations, source) = match declared {
            Some(organizations) => (organizations, None),
            None => {
                let source = Arc::new(
                    Dispatcher::new(hosts.remove(0), config, Arc::clone(&transport))
                        .with_dry_run(false),
                );
                (self.clone_source(&source).await?, Some(source))
            }
        };

        let dispatchers: Vec<Arc<Dispatcher>> = hosts
            .into_iter()
            .map(|target| Arc::new(Dispatcher::new(target, config, Arc::clone(&transport))))
            .collect();

        self.output.subsection("Replicating");
        self.output.info(&format!(
            "{} organizations to {} hosts",
            organizations.len(),
            dispatchers.len()
        ));

        let replicator = Replicator::new(dispatchers, config, self.output.clone());
        replicator.verify_logins().await?;
        replicator.replicate(&organizations).await?;

        let report = RunReport {
            organizations: organizations.len(),
            source: source.map(|d| d.stats()),
            hosts: replicator.dispatchers().iter().map(|d| d.stats()).collect(),
            elapsed: self.output.elapsed(),
        };
        self.print_summary(&report);

        let failed = report.failed_actions();
        if failed > 0 {
            self.output
                .error(&format!("{} actions were skipped after exhausting their retries", failed));
            return Err(ReplicationError::ActionsFailed { count: failed });
        }

        self.output.success(&format!(
            "Replication completed successfully in {}",
            self.output.format_duration(report.elapsed)
        ));
        Ok(report)
    }

    fn load_hosts(&self) -> Result<Vec<HostTarget>> {
        let path = self.settings.quays_file.as_ref().ok_or_else(|| {
            ReplicationError::Configuration("No quays file given (--quaysfile)".to_string())
        })?;
        let hosts = loader::load_hosts(path)?;

        if self.settings.config.clone {
            if hosts.len() < 2 {
                return Err(ReplicationError::Configuration(
                    "Clone mode needs at least 2 quays: a source and a destination".to_string(),
                ));
            }
        } else if hosts.is_empty() {
            return Err(ReplicationError::Configuration(format!(
                "No quays defined in {}",
                path.display()
            )));
        }

        self.output
            .info(&format!("Loaded {} quays from {}", hosts.len(), path.display()));
        Ok(hosts)
    }

    fn load_organizations(&self) -> Result<Vec<Organization>> {
        let organizations = loader::load_organizations(&self.settings.repo_files)?;
        if organizations.is_empty() {
            self.output.warning("No organization files given, nothing to replicate");
        }
        for org in &organizations {
            self.output.detail(&format!(
                "org {}: {} repositories, {} robots, {} teams",
                org.name,
                org.repositories.len(),
                org.robots.len(),
                org.teams.len()
            ));
        }
        Ok(organizations)
    }

    async fn clone_source(&self, source: &Arc<Dispatcher>) -> Result<Vec<Organization>> {
        self.output
            .subsection(&format!("Reading source quay {}", source.host()));

        // Reads have no side effects, so the source is queried even in dry run.
        source.verify_login().await?;
        self.output.step(&format!("Login ok on {}", source.host()));

        let introspector = SourceIntrospector::new(Arc::clone(source), self.output.clone());
        let organizations = introspector.fetch().await?;
        loader::ensure_unique(&organizations)?;

        self.output
            .success(&format!("Read {} organizations from source", organizations.len()));
        Ok(organizations)
    }

    fn print_summary(&self, report: &RunReport) {
        let mut items = vec![
            ("Organizations", report.organizations.to_string()),
            ("Elapsed", self.output.format_duration(report.elapsed)),
        ];
        for host in report.source.iter().chain(&report.hosts) {
            items.push((
                host.host.as_str(),
                format!(
                    "{} calls, peak {} in flight, {} failed actions, {} gate resets",
                    host.admission.completed,
                    host.admission.peak_in_flight,
                    host.failed_actions,
                    host.admission.resets
                ),
            ));
        }
        self.output.summary_kv("Summary", &items);
    }
}
