pub mod critical_time;
pub mod load_variation;
pub mod margin;
pub mod simulate;
pub mod systematic;
pub mod telemetry;
pub mod util;
