//! Hydrological conditioning and flow routing
//!
//! Algorithms for hydrological modeling from Digital Elevation Models:
//! - Breach depressions: least-cost channels out of every pit
//! - Fast breaching: Priority-Flood back-link trenches with fill fallback
//! - Priority-Flood and Planchon-Darboux depression filling
//! - Flow pointers: D8 and D-infinity
//! - Flow accumulation: D8, D-infinity and FD8
//! - No-flow cells: verification that no pits remain

mod breach;
mod breach_fast;
mod fill_sinks;
mod flow_accumulation;
mod flow_accumulation_dinf;
mod flow_direction;
mod flow_direction_dinf;
mod flow_direction_mfd;
pub mod grid_cell;
mod no_flow;
mod priority_flood;

pub use breach::{breach_depressions, default_small_value, BreachDepressions, BreachParams, BreachResult};
pub use breach_fast::{breach_depressions_fast, BreachDepressionsFast, BreachFastParams, BreachFastResult};
pub use fill_sinks::{fill_depressions_pandd, FillDepressionsPandD};
pub use flow_accumulation::{
    flow_accumulation_d8, num_inflowing_neighbours, AccumOutput, AccumParams, FlowAccumD8,
    NumInflowingNeighbours,
};
pub use flow_accumulation_dinf::{dinf_proportions, flow_accumulation_dinf, FlowAccumDinf};
pub use flow_direction::{d8_pointer, steepest_neighbour, D8Pointer};
pub use flow_direction_dinf::{dinf_pointer, DInfPointer, NO_FLOW};
pub use flow_direction_mfd::{fd8_proportions, flow_accumulation_fd8, Fd8Params, FlowAccumFd8, MAX_POWER};
pub use grid_cell::{ElevationQuantizer, GridCell, PackedCell};
pub use no_flow::{find_no_flow_cells, has_lower_neighbour, interior_pits, is_interior_pit, FindNoFlowCells};
pub use priority_flood::{fill_depressions, FillDepressions, FillParams, DEFAULT_SMALL_NUM};
