pub mod command_probe;
pub mod context;
pub mod critical_time;
pub mod export;
pub mod load_variation;
pub mod margin;
pub mod probe;
pub mod store;
pub mod systematic;
pub mod task;

pub use command_probe::CommandProbe;
pub use context::{for_each, SingleProcess, ThreadCluster, ThreadEndpoint, WorkDistributionContext};
pub use critical_time::{BisectionOutcome, BisectionSearch, CriticalTimeLauncher, ProbeVerdict};
pub use export::{
    write_export, write_outputs, CriticalTimeExport, MarginExport, SystematicExport,
};
pub use load_variation::{run_load_variation, run_simulation};
pub use margin::{MarginCalculationLauncher, MarginReport, MarginState, ScenarioMargin};
pub use probe::{
    execute_probe, CancellationToken, ProbeError, ProbeKind, ProbeOutput, ProbeRequest, ProbeRun,
    SimulationProbe,
};
pub use systematic::{SystematicAnalysis, SystematicAnalysisLauncher};
pub use task::{TaskId, TaskMessage, TaskOutcome, TaskReport};
