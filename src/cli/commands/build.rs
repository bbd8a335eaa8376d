//! Build command - install the runtime and gems for an application

use crate::cache::CacheDecision;
use crate::cli::args::BuildArgs;
use crate::config::Config;
use crate::env::BuildEnvironment;
use crate::error::{RbpackError, RbpackResult};
use crate::exec::SystemRunner;
use crate::layout::BuildLayout;
use crate::pipeline::{BuildReport, Collaborators, Pipeline};
use crate::ui::{self, UiContext};
use serde_json::json;
use tracing::debug;

/// Execute the build command
pub async fn execute(args: BuildArgs, mut config: Config) -> RbpackResult<()> {
    let ctx = UiContext::detect();

    if !args.build_dir.is_dir() {
        return Err(RbpackError::PathNotFound(args.build_dir));
    }
    let build_dir = args
        .build_dir
        .canonicalize()
        .map_err(|e| RbpackError::io(format!("resolving {}", args.build_dir.display()), e))?;
    tokio::fs::create_dir_all(&args.cache_dir)
        .await
        .map_err(|e| RbpackError::io(format!("creating {}", args.cache_dir.display()), e))?;
    let cache_dir = args
        .cache_dir
        .canonicalize()
        .map_err(|e| RbpackError::io(format!("resolving {}", args.cache_dir.display()), e))?;

    if let Some(stack) = args.stack {
        config.runtime.stack = stack;
    }
    if args.no_cache {
        config.cache.enabled = false;
    }

    let mut env = BuildEnvironment::from_process();
    if let Some(ref env_dir) = args.env_dir {
        debug!("Reading user environment from {}", env_dir.display());
        env = env.with_env_dir(env_dir)?;
    }
    for (key, value) in args.env {
        env = env.with(key, value);
    }

    if !args.json {
        ui::intro(&ctx, &format!("Building {}", build_dir.display()));
    }

    let layout = BuildLayout::new(build_dir, cache_dir);
    let mut collaborators = Collaborators::system(&config, &layout);
    if args.json {
        collaborators.runner = Box::new(SystemRunner::quiet());
    }
    let report = Pipeline::new(config, layout, env, collaborators).run().await?;

    if args.json {
        print_report_json(&report)?;
    } else {
        print_report(&ctx, &report);
    }
    Ok(())
}

fn print_report(ctx: &UiContext, report: &BuildReport) {
    ui::step_ok_detail(
        ctx,
        &format!("Using {}", report.ruby_version),
        &format!("from {}", report.source),
    );
    ui::step_info(ctx, &format!("Gemfile.lock {}", report.lockfile_hash));
    if let Some(ref bootstrap) = report.bootstrap_version {
        ui::step_info(ctx, &format!("Built with {}", bootstrap));
    }
    for artifact in &report.fetched {
        ui::step_ok(ctx, &format!("Installed {}", artifact));
    }

    match &report.cache {
        CacheDecision::Kept => ui::step_ok(ctx, "Reused cached gems"),
        CacheDecision::Purged(reason) => {
            ui::step_warn_hint(ctx, "Cached gems discarded", &reason.to_string())
        }
    }

    let mode = if report.deployment {
        "deployment mode"
    } else {
        "lockfile regenerated"
    };
    match report.bundled_with {
        Some(ref bundled_with) => ui::step_ok_detail(
            ctx,
            "Gems installed",
            &format!("{}, bundled with {}", mode, bundled_with),
        ),
        None => ui::step_ok_detail(ctx, "Gems installed", mode),
    }

    for warning in &report.warnings {
        ui::step_warn(ctx, warning);
    }
    ui::remark(
        ctx,
        &format!("Runtime environment: {}", report.profile_script.display()),
    );

    ui::outro_success(
        ctx,
        &format!("Build complete in {:.1}s", report.duration.as_secs_f64()),
    );
}

fn print_report_json(report: &BuildReport) -> RbpackResult<()> {
    let cache = match &report.cache {
        CacheDecision::Kept => json!({ "decision": "kept" }),
        CacheDecision::Purged(reason) => {
            json!({ "decision": "purged", "reason": reason.to_string() })
        }
    };
    let value = json!({
        "ruby_version": report.ruby_version,
        "bootstrap_version": report.bootstrap_version,
        "source": report.source,
        "lockfile_hash": report.lockfile_hash,
        "fetched": report.fetched,
        "cache": cache,
        "deployment": report.deployment,
        "lockfile_regenerated": report.lockfile_regenerated,
        "bundled_with": report.bundled_with,
        "profile_script": report.profile_script,
        "warnings": report.warnings,
        "duration_secs": report.duration.as_secs_f64(),
    });
    println!("{}", serde_json::to_string_pretty(&value)?);
    Ok(())
}
