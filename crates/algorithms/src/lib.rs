//! # Drainflow Algorithms
//!
//! Hydrological conditioning and flow routing over DEM rasters.
//!
//! ## Modules
//!
//! - **hydrology**: breaching, depression filling, D8 and D-infinity pointers,
//!   D8 / D-infinity / FD8 flow accumulation, no-flow cell detection
//! - **tools**: name-keyed registry running each algorithm from an ordered
//!   argument list of file paths and parameters

pub mod hydrology;
mod maybe_rayon;
pub mod tools;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::hydrology::{
        breach_depressions, breach_depressions_fast, d8_pointer, dinf_pointer,
        fill_depressions, fill_depressions_pandd, find_no_flow_cells, flow_accumulation_d8,
        flow_accumulation_dinf, flow_accumulation_fd8, num_inflowing_neighbours, AccumOutput,
        AccumParams, BreachDepressions, BreachDepressionsFast, BreachFastParams, BreachParams,
        D8Pointer, DInfPointer, Fd8Params, FillDepressions, FillDepressionsPandD, FillParams,
        FindNoFlowCells, FlowAccumD8, FlowAccumDinf, FlowAccumFd8, NumInflowingNeighbours,
    };
    pub use crate::tools::{find_tool, run_tool, ToolInfo, ToolReport, TOOLS};
    pub use drainflow_core::prelude::*;
}
