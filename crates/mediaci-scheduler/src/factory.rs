//! Command factories for builds, tests and the trigger build.
//!
//! Every command is a deterministic function of the specification, the change
//! event, the global [`FactoryConfig`] and the platform of the worker that
//! runs it.

use mediaci_core::config::FactoryConfig;
use mediaci_core::event::ChangeEvent;
use mediaci_core::spec::{
    BuildSpecification, BuildType, Os, ProductType, TestFactoryKind, TestSpecification,
};
use mediaci_core::stage::{BuildStage, PlannedStage, StageCommand, TestStage};
use std::path::{Path, PathBuf};

const BUILD_SCRIPTS_DIR: &str = "infrastructure/build_scripts";
const COMMON_DIR: &str = "infrastructure/common";
const PRE_COMMIT_DIR: &str = "infrastructure/pre_commit_checks";
const TEST_ADAPTER_DIR: &str = "infrastructure/ted_adapter";

/// Printed by the component checker when the shared build is current.
pub const REBUILD_NOT_NEEDED: &str = "REBUILD IS NOT NEEDED";

/// Renders the external commands of every plan.
#[derive(Debug, Clone, Default)]
pub struct StageFactory {
    config: FactoryConfig,
    os: Os,
}

impl StageFactory {
    pub fn new(config: FactoryConfig) -> Self {
        Self {
            config,
            os: Os::default(),
        }
    }

    /// The same factory, rendering commands for a worker running `os`.
    pub fn for_os(&self, os: Os) -> Self {
        Self {
            config: self.config.clone(),
            os,
        }
    }

    pub fn config(&self) -> &FactoryConfig {
        &self.config
    }

    pub fn os(&self) -> Os {
        self.os
    }

    fn run_command(&self) -> &str {
        self.config.run_command_for(self.os)
    }

    fn under_root(&self, relative: impl AsRef<Path>) -> String {
        self.os.render_path(&self.config.build_root.join(relative))
    }

    /// The `deploying infrastructure` step, if enabled.
    ///
    /// Changes to the product-configs repository deploy that exact revision;
    /// any other change deploys the infrastructure as of the change's time.
    pub fn infrastructure_step(&self, event: &ChangeEvent) -> Option<StageCommand> {
        if !self.config.deploy_infrastructure {
            return None;
        }

        let command = StageCommand::new("deploying infrastructure", self.run_command(), COMMON_DIR)
            .arg("extract_repo.py")
            .args(["--repo-name", self.config.infrastructure_repo.as_str()])
            .args(["--root-dir".to_string(), self.os.render_path(&self.config.build_root)]);

        let command = if event.repository_name() == self.config.product_configs_repo {
            command
                .args(["--commit-id", event.revision.as_str()])
                .args(["--branch", event.branch.as_str()])
        } else {
            let commit_time = event.created_at.format("%Y-%m-%d %H:%M:%S").to_string();
            command
                .args(["--commit-time".to_string(), commit_time])
                .args(["--branch", event.effective_branch()])
        };

        Some(command)
    }

    /// Steps of the preliminary trigger build: checkout and pre-commit checks.
    pub fn trigger_steps(&self, event: &ChangeEvent) -> Vec<StageCommand> {
        let run = self.run_command();
        let repository = event.repository_name();
        let repo_path = self.under_root(Path::new("repositories").join(repository));

        let mut steps: Vec<StageCommand> = self.infrastructure_step(event).into_iter().collect();
        steps.push(
            StageCommand::new("extract repository", run, COMMON_DIR)
                .arg("extract_repo.py")
                .args(["--root-dir".to_string(), self.under_root("repositories")])
                .args(["--repo-name", repository])
                .args(["--branch", event.branch.as_str()])
                .args(["--commit-id", event.revision.as_str()]),
        );
        steps.push(
            StageCommand::new("check author name and email", run, PRE_COMMIT_DIR)
                .arg("check_author.py")
                .args(["--repo-path", repo_path.as_str()])
                .args(["--revision", event.revision.as_str()]),
        );
        steps.push(
            StageCommand::new(
                "check copyright",
                run,
                Path::new(PRE_COMMIT_DIR).join("check_copyright"),
            )
            .arg("check_copyright.py")
            .args(["--repo-path", repo_path.as_str()])
            .args(["--commit-id", event.revision.as_str()])
            .args(["--report-path".to_string(), self.under_root("checks/pre_commit_checks.json")]),
        );
        steps
    }

    /// Arguments shared by all six stages of a build, without `--stage`.
    pub fn build_arguments(&self, build: &BuildSpecification, event: &ChangeEvent) -> Vec<String> {
        let mut args = vec![
            "build_runner.py".to_string(),
            "--build-config".to_string(),
            self.under_root(Path::new("product-configs").join(&build.product_conf_file)),
            "--root-dir".to_string(),
            self.under_root("build_dir"),
            "--build-type".to_string(),
            build.build_type.to_string(),
            "--build-event".to_string(),
            self.config.build_event.clone(),
            "--product-type".to_string(),
            build.product_type.to_string(),
            format!("compiler={}", build.compiler),
            format!("compiler_version={}", build.compiler_version),
        ];

        match &build.dependency_name {
            Some(component) => {
                args.push("--manifest".to_string());
                args.push(self.under_root(&self.config.manifest_path));
                args.push("--component".to_string());
                args.push(component.clone());
            }
            None => {
                args.push("--changed-repo".to_string());
                args.push(event.changed_repo());
            }
        }

        if build.api_latest {
            args.push("api_latest=True".to_string());
        }
        if build.fastboot {
            args.push("fastboot=True".to_string());
        }
        if let Some(target_branch) = &event.target_branch {
            args.push("--target-branch".to_string());
            args.push(target_branch.clone());
        }
        args
    }

    /// Checks the shared storage for a current build of the build's component.
    ///
    /// When the checker reports [`REBUILD_NOT_NEEDED`] the six stages are
    /// skipped. Builds without a `dependency_name` have no check.
    pub fn dependency_check(&self, build: &BuildSpecification) -> Option<StageCommand> {
        let component = build.dependency_name.as_deref()?;
        Some(
            StageCommand::new(format!("check {} on share", component), self.run_command(), COMMON_DIR)
                .arg("component_checker.py")
                .args(["--path-to-manifest".to_string(), self.under_root(&self.config.manifest_path)])
                .args(["--component-name", component])
                .with_up_to_date_marker(REBUILD_NOT_NEEDED),
        )
    }

    /// The six build stages, in their fixed order.
    pub fn stage_sequence(&self, build: &BuildSpecification, event: &ChangeEvent) -> Vec<PlannedStage> {
        let base = self.build_arguments(build, event);
        BuildStage::ALL
            .iter()
            .map(|&stage| PlannedStage {
                stage,
                command: StageCommand::new(stage.as_str(), self.run_command(), BUILD_SCRIPTS_DIR)
                    .args(base.iter().cloned())
                    .args(["--stage", stage.as_str()]),
            })
            .collect()
    }

    /// Steps of a test run.
    pub fn test_steps(&self, test: &TestSpecification, event: &ChangeEvent) -> Vec<StageCommand> {
        let mut steps: Vec<StageCommand> = self.infrastructure_step(event).into_iter().collect();
        match test.factory {
            TestFactoryKind::Adapter => steps.push(
                StageCommand::new("test", self.run_command(), TEST_ADAPTER_DIR)
                    .arg("test_adapter.py")
                    .args(["--branch", event.branch.as_str()])
                    .args(["--build-event", self.config.build_event.as_str()])
                    .args(["--product-type", test.product_type.as_str()])
                    .args(["--commit-id", event.revision.as_str()])
                    .args(["--build-type", test.build_type.as_str()])
                    .args(["--root-dir".to_string(), self.under_root("build_dir")]),
            ),
            TestFactoryKind::Driver => {
                let artifacts = self
                    .os
                    .render_path(&self.artifacts_dir(event, &test.product_type, test.build_type));
                for stage in TestStage::ALL {
                    steps.push(
                        StageCommand::new(stage.as_str(), self.run_command(), BUILD_SCRIPTS_DIR)
                            .arg("tests_runner.py")
                            .args(["--artifacts", artifacts.as_str()])
                            .args(["--root-dir".to_string(), self.os.render_path(&self.config.build_root)])
                            .args(["--stage", stage.as_str()]),
                    );
                }
            }
        }
        steps
    }

    /// Where the artifacts of a build are published.
    ///
    /// `<builds_root>/<branch>/<build_event>/<revision>/<product_type>_<build_type>`
    pub fn artifacts_dir(
        &self,
        event: &ChangeEvent,
        product_type: &ProductType,
        build_type: BuildType,
    ) -> PathBuf {
        let branch = event
            .branch
            .strip_prefix("refs/changes/")
            .unwrap_or(&event.branch);
        self.config
            .builds_root
            .join(branch)
            .join(&self.config.build_event)
            .join(&event.revision)
            .join(format!("{}_{}", product_type, build_type))
    }
}
