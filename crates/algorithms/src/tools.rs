//! Name-keyed tool registry
//!
//! Every hydrology algorithm is exposed as a runner taking an ordered list of
//! string arguments: input path, output path, then tool-specific parameters.
//! An empty argument or `"not specified"` leaves an optional parameter at its
//! default. Arguments are parsed and checked before any input is read, and
//! outputs are written only once the algorithm has finished.

use std::fmt::Display;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use drainflow_core::io::{read_geotiff, write_geotiff};
use drainflow_core::{Error, Progress, Raster, Result};

use crate::hydrology::{
    breach_depressions, breach_depressions_fast, d8_pointer, dinf_pointer, fill_depressions,
    fill_depressions_pandd, find_no_flow_cells, flow_accumulation_d8, flow_accumulation_dinf,
    flow_accumulation_fd8, num_inflowing_neighbours, AccumOutput, AccumParams, BreachFastParams,
    BreachParams, Fd8Params, FillParams,
};

/// Signature shared by every tool runner
pub type ToolFn = fn(&[String], &dyn Progress) -> Result<ToolReport>;

/// Registry entry
#[derive(Clone, Copy)]
pub struct ToolInfo {
    pub name: &'static str,
    pub description: &'static str,
    /// Ordered arguments; bracketed ones are optional
    pub synopsis: &'static str,
    pub run: ToolFn,
}

impl std::fmt::Debug for ToolInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolInfo")
            .field("name", &self.name)
            .field("synopsis", &self.synopsis)
            .finish()
    }
}

/// What a tool run produced
#[derive(Debug, Clone, Default)]
pub struct ToolReport {
    /// Files written, primary output first
    pub outputs: Vec<PathBuf>,
    /// One-line summary for the user
    pub summary: String,
}

/// Every available tool
pub static TOOLS: &[ToolInfo] = &[
    ToolInfo {
        name: "BreachDepressions",
        description: "Remove depressions by carving least-cost channels out of each pit",
        synopsis: "<dem> <output> [max_dist] [max_cost] [a_small_value] [max_radius]",
        run: run_breach,
    },
    ToolInfo {
        name: "BreachDepressionsFast",
        description: "Breach depressions along Priority-Flood paths, filling pits beyond the limits",
        synopsis: "<dem> <output> [max_depth] [max_length] [constrained] [output_pointer] [flow_accum]",
        run: run_breach_fast,
    },
    ToolInfo {
        name: "FillDepressions",
        description: "Fill depressions with the Priority-Flood method",
        synopsis: "<dem> <output> [small_num]",
        run: run_fill,
    },
    ToolInfo {
        name: "FillDepressionsPandD",
        description: "Fill depressions with the Planchon-Darboux method",
        synopsis: "<dem> <output> [small_num]",
        run: run_fill_pandd,
    },
    ToolInfo {
        name: "D8Pointer",
        description: "Steepest-descent D8 flow pointer",
        synopsis: "<dem> <output>",
        run: run_d8_pointer,
    },
    ToolInfo {
        name: "DInfPointer",
        description: "D-infinity flow direction in degrees clockwise from north",
        synopsis: "<dem> <output>",
        run: run_dinf_pointer,
    },
    ToolInfo {
        name: "FlowAccumD8",
        description: "D8 flow accumulation from a D8 pointer",
        synopsis: "<pointer> <output> [output_type] [log]",
        run: run_accum_d8,
    },
    ToolInfo {
        name: "FlowAccumDinf",
        description: "D-infinity flow accumulation from a D-infinity pointer",
        synopsis: "<pointer> <output> [output_type] [log]",
        run: run_accum_dinf,
    },
    ToolInfo {
        name: "FlowAccumFD8",
        description: "FD8 multiple flow direction accumulation from a DEM",
        synopsis: "<dem> <output> [power] [output_type] [log] [threshold]",
        run: run_accum_fd8,
    },
    ToolInfo {
        name: "FindNoFlowCells",
        description: "Flag cells with no lower neighbour",
        synopsis: "<dem> <output>",
        run: run_no_flow,
    },
    ToolInfo {
        name: "NumInflowingNeighbours",
        description: "Count the D8 neighbours draining into each cell",
        synopsis: "<pointer> <output>",
        run: run_num_inflowing,
    },
];

/// Look a tool up by name, ignoring case
pub fn find_tool(name: &str) -> Option<&'static ToolInfo> {
    TOOLS.iter().find(|t| t.name.eq_ignore_ascii_case(name))
}

/// Run a tool by name.
///
/// Failures other than cancellation are also sent to the sink as feedback;
/// a cancelled tool has already said so.
pub fn run_tool(name: &str, args: &[String], progress: &dyn Progress) -> Result<ToolReport> {
    let tool = find_tool(name)
        .ok_or_else(|| Error::invalid_param("tool", name, "no tool with this name"))?;
    tracing::debug!("Running {} with {:?}", tool.name, args);

    match (tool.run)(args, progress) {
        Ok(report) => {
            progress.feedback(&report.summary);
            Ok(report)
        }
        Err(Error::Cancelled) => Err(Error::Cancelled),
        Err(e) => {
            progress.feedback(&e.to_string());
            Err(e)
        }
    }
}

/// Positional view over a tool's arguments
struct ToolArgs<'a>(&'a [String]);

impl<'a> ToolArgs<'a> {
    /// Argument `i`, or `None` when absent, blank or "not specified"
    fn get(&self, i: usize) -> Option<&'a str> {
        self.0
            .get(i)
            .map(|s| s.trim())
            .filter(|s| !s.is_empty() && !s.eq_ignore_ascii_case("not specified"))
    }

    fn path(&self, i: usize, name: &'static str) -> Result<PathBuf> {
        self.get(i).map(PathBuf::from).ok_or(Error::MissingArgument(name))
    }

    fn parse<T>(&self, i: usize, name: &'static str) -> Result<Option<T>>
    where
        T: FromStr,
        T::Err: Display,
    {
        match self.get(i) {
            None => Ok(None),
            Some(s) => s
                .parse()
                .map(Some)
                .map_err(|e: T::Err| Error::invalid_param(name, s, e.to_string())),
        }
    }

    fn flag(&self, i: usize, name: &'static str) -> Result<bool> {
        match self.get(i) {
            None => Ok(false),
            Some(s) => s
                .to_ascii_lowercase()
                .parse()
                .map_err(|_| Error::invalid_param(name, s, "expected true or false")),
        }
    }

    fn accum_params(&self, type_at: usize, log_at: usize) -> Result<AccumParams> {
        Ok(AccumParams {
            output_type: match self.get(type_at) {
                Some(s) => s.parse::<AccumOutput>()?,
                None => AccumOutput::default(),
            },
            log_transform: self.flag(log_at, "log")?,
        })
    }
}

/// `out.tif` + `_flow_pntr` -> `out_flow_pntr.tif`
fn sibling_path(path: &Path, suffix: &str) -> PathBuf {
    let stem = path.file_stem().map(|s| s.to_string_lossy()).unwrap_or_default();
    let name = match path.extension() {
        Some(ext) => format!("{}{}.{}", stem, suffix, ext.to_string_lossy()),
        None => format!("{}{}", stem, suffix),
    };
    path.with_file_name(name)
}

fn read_input(path: &Path) -> Result<Raster<f64>> {
    let raster: Raster<f64> = read_geotiff(path)?;
    tracing::debug!("Read {} ({} x {})", path.display(), raster.rows(), raster.cols());
    Ok(raster)
}

fn write_output(raster: &Raster<f64>, path: &Path) -> Result<()> {
    write_geotiff(raster, path)?;
    tracing::debug!("Wrote {}", path.display());
    Ok(())
}

/// Shared shape of the single-input, single-output tools
fn run_simple<F>(args: &[String], input_name: &'static str, progress: &dyn Progress, algorithm: F) -> Result<ToolReport>
where
    F: FnOnce(&Raster<f64>, &dyn Progress) -> Result<Raster<f64>>,
{
    let args = ToolArgs(args);
    let input = args.path(0, input_name)?;
    let output = args.path(1, "output")?;
    let raster = read_input(&input)?;
    let result = algorithm(&raster, progress)?;
    write_output(&result, &output)?;
    Ok(ToolReport {
        summary: format!("Output written to {}", output.display()),
        outputs: vec![output],
    })
}

fn run_breach(args: &[String], progress: &dyn Progress) -> Result<ToolReport> {
    let a = ToolArgs(args);
    let input = a.path(0, "dem")?;
    let output = a.path(1, "output")?;
    let defaults = BreachParams::default();
    let params = BreachParams {
        radius: a.parse(2, "max_dist")?.unwrap_or(defaults.radius),
        max_cost: a.parse(3, "max_cost")?,
        a_small_value: a.parse(4, "a_small_value")?,
        max_radius: a.parse(5, "max_radius")?,
    };
    params.validate()?;

    let dem = read_input(&input)?;
    let result = breach_depressions(&dem, &params, progress)?;
    write_output(&result.dem, &output)?;

    Ok(ToolReport {
        summary: format!(
            "{} pits found, {} solved, {} unsolved",
            result.pits, result.solved, result.unsolved
        ),
        outputs: vec![output],
    })
}

fn run_breach_fast(args: &[String], progress: &dyn Progress) -> Result<ToolReport> {
    let a = ToolArgs(args);
    let input = a.path(0, "dem")?;
    let output = a.path(1, "output")?;
    let params = BreachFastParams {
        max_depth: a.parse(2, "max_depth")?,
        max_length: a.parse(3, "max_length")?,
        constrained: a.flag(4, "constrained")?,
        output_pointer: a.flag(5, "output_pointer")?,
        flow_accumulation: a.flag(6, "flow_accum")?,
    };
    params.validate()?;

    let dem = read_input(&input)?;
    let result = breach_depressions_fast(&dem, &params, progress)?;

    let mut outputs = vec![output.clone()];
    write_output(&result.dem, &output)?;
    if let Some(pointer) = &result.pointer {
        let path = sibling_path(&output, "_flow_pntr");
        write_output(pointer, &path)?;
        outputs.push(path);
    }
    if let Some(accum) = &result.accumulation {
        let path = sibling_path(&output, "_flow_accum");
        write_output(accum, &path)?;
        outputs.push(path);
    }

    Ok(ToolReport {
        summary: format!(
            "{} pits found, {} breached, {} filled",
            result.pits, result.breached, result.deferred
        ),
        outputs,
    })
}

fn fill_params(a: &ToolArgs<'_>) -> Result<FillParams> {
    let params = FillParams {
        small_num: a.parse(2, "small_num")?.unwrap_or(FillParams::default().small_num),
    };
    params.validate()?;
    Ok(params)
}

fn run_fill(args: &[String], progress: &dyn Progress) -> Result<ToolReport> {
    let params = fill_params(&ToolArgs(args))?;
    run_simple(args, "dem", progress, |dem, p| fill_depressions(dem, &params, p))
}

fn run_fill_pandd(args: &[String], progress: &dyn Progress) -> Result<ToolReport> {
    let params = fill_params(&ToolArgs(args))?;
    run_simple(args, "dem", progress, |dem, p| fill_depressions_pandd(dem, &params, p))
}

fn run_d8_pointer(args: &[String], progress: &dyn Progress) -> Result<ToolReport> {
    run_simple(args, "dem", progress, d8_pointer)
}

fn run_dinf_pointer(args: &[String], progress: &dyn Progress) -> Result<ToolReport> {
    run_simple(args, "dem", progress, dinf_pointer)
}

fn run_accum_d8(args: &[String], progress: &dyn Progress) -> Result<ToolReport> {
    let params = ToolArgs(args).accum_params(2, 3)?;
    run_simple(args, "pointer", progress, |ptr, p| flow_accumulation_d8(ptr, &params, p))
}

fn run_accum_dinf(args: &[String], progress: &dyn Progress) -> Result<ToolReport> {
    let params = ToolArgs(args).accum_params(2, 3)?;
    run_simple(args, "pointer", progress, |ptr, p| flow_accumulation_dinf(ptr, &params, p))
}

fn run_accum_fd8(args: &[String], progress: &dyn Progress) -> Result<ToolReport> {
    let a = ToolArgs(args);
    let accum = a.accum_params(3, 4)?;
    let params = Fd8Params {
        power: a.parse(2, "power")?.unwrap_or(Fd8Params::default().power),
        threshold: a.parse(5, "threshold")?,
        output_type: accum.output_type,
        log_transform: accum.log_transform,
    };
    params.validate()?;
    run_simple(args, "dem", progress, |dem, p| flow_accumulation_fd8(dem, &params, p))
}

fn run_no_flow(args: &[String], progress: &dyn Progress) -> Result<ToolReport> {
    let mut flagged = 0usize;
    let mut report = run_simple(args, "dem", progress, |dem, p| {
        let out = find_no_flow_cells(dem, p)?;
        flagged = out.data().iter().filter(|&&v| v == 1.0).count();
        Ok(out)
    })?;
    report.summary = format!("{} no-flow cells; {}", flagged, report.summary);
    Ok(report)
}

fn run_num_inflowing(args: &[String], progress: &dyn Progress) -> Result<ToolReport> {
    run_simple(args, "pointer", progress, num_inflowing_neighbours)
}

#[cfg(test)]
mod tests {
    use super::*;
    use drainflow_core::{GeoTransform, SilentProgress};
    use tempfile::TempDir;

    fn args(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    /// 5x5 bowl with a pit at the centre, saved to `dir/dem.tif`
    fn write_bowl(dir: &TempDir) -> PathBuf {
        let mut dem: Raster<f64> = Raster::filled(5, 5, 20.0);
        dem.set_transform(GeoTransform::new(0.0, 50.0, 10.0, -10.0));
        dem.set_nodata(Some(-32768.0));
        for row in 1..4 {
            for col in 1..4 {
                dem.set(row, col, 10.0).unwrap();
            }
        }
        dem.set(2, 2, 0.0).unwrap();
        let path = dir.path().join("dem.tif");
        write_geotiff(&dem, &path).unwrap();
        path
    }

    #[test]
    fn test_lookup_ignores_case() {
        assert_eq!(find_tool("flowaccumfd8").unwrap().name, "FlowAccumFD8");
        assert_eq!(find_tool("BREACHDEPRESSIONSFAST").unwrap().name, "BreachDepressionsFast");
        assert!(find_tool("Watershed").is_none());
    }

    #[test]
    fn test_names_are_unique() {
        for (i, a) in TOOLS.iter().enumerate() {
            for b in &TOOLS[i + 1..] {
                assert!(!a.name.eq_ignore_ascii_case(b.name), "duplicate tool {}", a.name);
            }
        }
    }

    #[test]
    fn test_unknown_tool_is_configuration_error() {
        let err = run_tool("NoSuchTool", &[], &SilentProgress).unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn test_not_specified_means_absent() {
        let raw = args(&["a.tif", "b.tif", "not specified", " ", "NOT SPECIFIED"]);
        let a = ToolArgs(&raw);
        assert_eq!(a.get(0), Some("a.tif"));
        assert_eq!(a.get(2), None);
        assert_eq!(a.get(3), None);
        assert_eq!(a.get(4), None);
        assert_eq!(a.get(9), None);
        assert_eq!(a.parse::<f64>(2, "max_depth").unwrap(), None);
        assert!(!a.flag(4, "constrained").unwrap());
    }

    #[test]
    fn test_bad_number_is_rejected() {
        let raw = args(&["a.tif", "b.tif", "deep"]);
        let err = ToolArgs(&raw).parse::<f64>(2, "max_depth").unwrap_err();
        assert!(matches!(err, Error::InvalidParameter { name: "max_depth", .. }));
    }

    #[test]
    fn test_sibling_path_keeps_extension() {
        let p = sibling_path(Path::new("/tmp/out/breached.tif"), "_flow_pntr");
        assert_eq!(p, PathBuf::from("/tmp/out/breached_flow_pntr.tif"));
        let q = sibling_path(Path::new("breached"), "_flow_accum");
        assert_eq!(q, PathBuf::from("breached_flow_accum"));
    }

    #[test]
    fn test_missing_output_writes_nothing() {
        let dir = TempDir::new().unwrap();
        let dem = write_bowl(&dir);
        let raw = args(&[dem.to_str().unwrap()]);
        let err = run_tool("FillDepressions", &raw, &SilentProgress).unwrap_err();
        assert!(matches!(err, Error::MissingArgument("output")));
    }

    #[test]
    fn test_invalid_parameter_is_caught_before_reading() {
        let dir = TempDir::new().unwrap();
        let out = dir.path().join("acc.tif");
        // The input does not exist: parameter validation must fail first
        let raw = args(&["missing.tif", out.to_str().unwrap(), "-2"]);
        let err = run_tool("FlowAccumFD8", &raw, &SilentProgress).unwrap_err();
        assert!(err.is_configuration());
        assert!(!out.exists());
    }

    #[test]
    fn test_fill_tool_writes_filled_dem() {
        let dir = TempDir::new().unwrap();
        let dem = write_bowl(&dir);
        let out = dir.path().join("filled.tif");
        let raw = args(&[dem.to_str().unwrap(), out.to_str().unwrap(), "0.001"]);

        let report = run_tool("FillDepressions", &raw, &SilentProgress).unwrap();
        assert_eq!(report.outputs, vec![out.clone()]);

        let filled: Raster<f64> = read_geotiff(&out).unwrap();
        assert!(filled.get(2, 2).unwrap() > 20.0);
        assert_eq!(filled.nodata(), Some(-32768.0));
    }

    #[test]
    fn test_breach_fast_tool_writes_pointer_and_accumulation() {
        let dir = TempDir::new().unwrap();
        let dem = write_bowl(&dir);
        let out = dir.path().join("breached.tif");
        let raw = args(&[
            dem.to_str().unwrap(),
            out.to_str().unwrap(),
            "not specified",
            "not specified",
            "false",
            "true",
            "true",
        ]);

        let report = run_tool("BreachDepressionsFast", &raw, &SilentProgress).unwrap();
        assert_eq!(report.outputs.len(), 3);
        assert!(dir.path().join("breached_flow_pntr.tif").exists());
        assert!(dir.path().join("breached_flow_accum.tif").exists());
        assert!(report.summary.starts_with("1 pits found"));
    }

    #[test]
    fn test_no_flow_tool_counts_pits() {
        let dir = TempDir::new().unwrap();
        let dem = write_bowl(&dir);
        let out = dir.path().join("noflow.tif");
        let raw = args(&[dem.to_str().unwrap(), out.to_str().unwrap()]);

        let report = run_tool("findnoflowcells", &raw, &SilentProgress).unwrap();
        let flags: Raster<f64> = read_geotiff(&out).unwrap();
        assert_eq!(flags.get(2, 2).unwrap(), 1.0);
        assert!(report.summary.contains("no-flow cells"));
    }
}
