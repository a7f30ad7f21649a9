//! Integration tests running the `solar_cooling_electric` example.
use energynet::input::ParameterTable;
use energynet::output::{read_scalars, read_time_series};
use example::{assert_outputs_exist, plot_files, run_example};
use float_cmp::assert_approx_eq;
use std::path::Path;

#[test]
fn test_solar_cooling_electric_example() {
    let run = run_example("solar_cooling_electric", false);
    assert_outputs_exist(&run);

    for scenario in run.config.scenarios() {
        let scalars = read_scalars(&run.paths.scalars_file(scenario)).unwrap();
        let solar_fraction = scalars["solar_fraction_el"].unwrap();
        assert!((-1e-6..=1.0 + 1e-6).contains(&solar_fraction));
        assert!(!scalars.contains_key("solar_fraction_thermal"));

        // No storage has a nominal capacity, so none adds to the costs
        assert_approx_eq!(
            f64,
            scalars["costs_with_storage"].unwrap(),
            scalars["costs_total"].unwrap(),
            epsilon = 1e-6
        );
        assert!(scalars["costs_without_storage"].unwrap() <= scalars["costs_total"].unwrap());

        // The grid covers at most its allowed share of the chiller's electricity
        let series = read_time_series(&run.paths.time_series_file(scenario)).unwrap();
        let total = |name: &str| -> f64 { series[name].iter().flatten().sum() };
        let variation = ParameterTable::from_path(Path::new(&format!(
            "demos/solar_cooling_electric/variation_{scenario}.csv"
        )))
        .unwrap();
        let share = variation.get("sol_fraction_el_variation").unwrap() * 0.5;
        assert!(total("grid_el") <= total("demand") / 3.0 * share + 1e-4);
        assert_approx_eq!(
            f64,
            scalars["grid_el_used"].unwrap(),
            total("grid_el"),
            epsilon = 1e-6
        );
    }

    // No CHP plant, so no operating point chart
    assert!(
        plot_files(&run)
            .iter()
            .all(|file| !file.ends_with("chp_operating_points.svg"))
    );
}
