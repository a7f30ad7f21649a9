//! Integration tests running the `flex_chp` example.
use energynet::input::TimeSeries;
use energynet::output::{read_scalars, read_time_series};
use example::{assert_outputs_exist, plot_files, run_example};
use float_cmp::assert_approx_eq;
use std::path::Path;

#[test]
fn test_flex_chp_example() {
    let run = run_example("flex_chp", true);
    assert_outputs_exist(&run);

    for scenario in run.config.scenarios() {
        assert!(run.paths.lp_file(scenario).is_file());
        assert!(run.paths.graph_file(scenario).is_file());
    }

    // Demands are fixed, so their totals are known in advance
    let demand = TimeSeries::from_path(Path::new("demos/flex_chp/demand.csv"), 24).unwrap();
    let demand_el: f64 = demand.column("demand_el").unwrap().iter().sum();
    let demand_th: f64 = demand.column("demand_th").unwrap().iter().sum();
    for scenario in run.config.scenarios() {
        let scalars = read_scalars(&run.paths.scalars_file(scenario)).unwrap();
        assert_eq!(scalars["id"], Some(scenario as f64));
        assert_approx_eq!(
            f64,
            scalars["demand_el_GWh"].unwrap(),
            demand_el * 40.0 / 1000.0,
            epsilon = 1e-6
        );
        assert_approx_eq!(
            f64,
            scalars["demand_th_GWh"].unwrap(),
            demand_th * 60.0 / 1000.0,
            epsilon = 1e-6
        );
    }

    // Storage columns are only there when the storage is
    let without_storage = read_time_series(&run.paths.time_series_file(0)).unwrap();
    assert!(!without_storage.contains_key("storage_th_content_relative"));
    let with_storage = read_time_series(&run.paths.time_series_file(2)).unwrap();
    assert!(with_storage.contains_key("storage_th_content_relative"));
    assert!(with_storage.contains_key("storage_el_charge"));

    let file_names: Vec<_> = plot_files(&run)
        .iter()
        .map(|path| path.file_name().unwrap().to_string_lossy().into_owned())
        .collect();
    assert_eq!(
        file_names,
        [
            "chp_operating_points.svg",
            "sensitivity.svg",
            "time_series_0.svg",
            "time_series_1.svg",
            "time_series_2.svg"
        ]
    );
}
