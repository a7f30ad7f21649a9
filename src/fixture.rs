//! Fixtures for tests

use crate::network::{EnergySystem, Flow, Node};
use crate::results::{FlowKey, FlowResult, INVEST, Results};
use indexmap::indexmap;
use rstest::fixture;

/// Assert that an error with the given message occurs
macro_rules! assert_error {
    ($result:expr, $msg:expr) => {
        assert_eq!(
            $result.unwrap_err().chain().next().unwrap().to_string(),
            $msg
        );
    };
}
pub(crate) use assert_error;

/// A single electricity bus with a fixed generator, a fixed demand and balancing nodes
#[fixture]
pub fn simple_system() -> EnergySystem {
    let mut system = EnergySystem::new(3);
    system.add_bus("electricity").unwrap();
    system
        .add(
            "generator",
            Node::Source {
                output: "electricity".into(),
                flow: Flow::fixed(vec![1.0; 3], 15.0),
            },
        )
        .unwrap();
    system
        .add(
            "demand_el",
            Node::Sink {
                input: "electricity".into(),
                flow: Flow::fixed(vec![0.5, 1.0, 0.0], 20.0),
            },
        )
        .unwrap();
    system
        .add(
            "excess_bel",
            Node::Sink {
                input: "electricity".into(),
                flow: Flow::with_costs(0.0),
            },
        )
        .unwrap();
    system
        .add(
            "shortage_bel",
            Node::Source {
                output: "electricity".into(),
                flow: Flow::with_costs(1000.0),
            },
        )
        .unwrap();

    system
}

fn sequence(values: &[f64]) -> FlowResult {
    FlowResult {
        sequence: values.to_vec(),
        scalars: indexmap! {},
    }
}

/// Results for a small network with a battery
#[fixture]
pub fn sample_results() -> Results {
    [
        (
            FlowKey::flow("generator", "electricity"),
            sequence(&[15.0, 15.0, 15.0]),
        ),
        (
            FlowKey::flow("electricity", "demand_el"),
            sequence(&[10.0, 20.0, 0.0]),
        ),
        (
            FlowKey::flow("electricity", "storage_el"),
            sequence(&[1.0, 1.0, 0.0]),
        ),
        (
            FlowKey::flow("storage_el", "electricity"),
            sequence(&[0.0, 0.0, 1.5]),
        ),
        (
            FlowKey::node("storage_el"),
            FlowResult {
                sequence: vec![1.0, 2.0, 0.5],
                scalars: indexmap! {INVEST.to_string() => 2.0},
            },
        ),
    ]
    .into_iter()
    .collect()
}
