use std::path::Path;

use anyhow::{Result, bail};
use podgrid_core::JobSpec;
use podgrid_placement::{AdmissionGate, ValidateResult};

use super::{EngineArgs, load_job};

pub fn validate(job: &Path, engine: &EngineArgs, format: &str) -> Result<()> {
    let config = engine.load_config()?;
    let job = load_job(job)?;
    let gate = AdmissionGate::new(&config);
    let verdict = gate.validate_job(&job);

    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&verdict)?),
        _ => println!("{}", describe(&gate, &job)),
    }

    if !verdict.pass {
        bail!("job {} rejected: {}", job.id, verdict.reason);
    }
    Ok(())
}

fn describe(gate: &AdmissionGate<'_>, job: &JobSpec) -> String {
    match gate.validate(job) {
        Ok(shape) => format!(
            "✓ {} admitted: {} virtual blocks of {} nodes, tp-block {} nodes ({} per block), {} NPUs per node",
            job.id,
            shape.virtual_blocks(job.task_count()),
            shape.sp_block,
            shape.tp_block,
            shape.slices_per_block(),
            shape.node_npus,
        ),
        Err(err) => {
            let verdict = ValidateResult::rejected(&err);
            format!("✗ {} rejected ({}): {}", job.id, verdict.reason, verdict.message)
        }
    }
}
