pub mod descriptor;
pub mod resolve;

pub use descriptor::{
    load_descriptor_from_path, CalculationDescriptor, CriticalTimeMode, CriticalTimeSpec,
    LoadIncreaseSpec, MarginCalculationSpec, MarginCalculationType, ScenarioEntry, ScenarioList,
};
pub use resolve::{
    critical_time_calculation, margin_calculation, resolve_scenarios, systematic_analysis,
    working_directory, CriticalTimeCalculation, LoadIncrease, MarginCalculation, ResolvedScenario,
    ScenarioSet,
};
