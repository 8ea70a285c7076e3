mod common;

use common::{
    components, control, ConstantKernel, FailingKernel, PanickingKernel, ToyKernel,
};
use seir_abc::pool::{distances, WorkerPool};
use seir_abc::PriorSampler;
use seir_core::{
    Algorithm, ErrorInfo, ParameterLayout, RequestKind, RngHandle, SeirError, SimulationKernel,
    SimulationOutput, SimulationRequest,
};

fn batch(rows: usize, layout: &ParameterLayout) -> Vec<Vec<f64>> {
    (0..rows)
        .map(|i| {
            let mut row = vec![0.1; layout.len()];
            row[0] = i as f64;
            row
        })
        .collect()
}

#[test]
fn identical_rows_on_two_workers_return_every_index() {
    common::init_logging();
    let model = components(control(Algorithm::BasicAbc, 10));
    let layout = ParameterLayout::from_components(&model);
    let kernel = ToyKernel { noise: 1e-3 };
    let rows = vec![vec![0.4, 0.3, 0.5, 0.5]; 4];

    let outputs = WorkerPool::new(&kernel, &model, &layout)
        .dispatch(&rows, RequestKind::Distance, 1)
        .unwrap();
    let results = distances(outputs).unwrap();

    assert_eq!(results.len(), 4);
    for result in &results {
        assert!((result - 0.1).abs() <= 1e-3 + 1e-12, "result {result}");
    }
}

#[test]
fn outcomes_follow_submission_order_for_any_pool_size() {
    let layout = ParameterLayout::new(1, 0, 1);
    let kernel = ToyKernel { noise: 0.0 };
    for cores in [1, 2, 3, 7] {
        let mut ctl = control(Algorithm::BasicAbc, 10);
        ctl.cpu_cores = cores;
        let model = components(ctl);
        for rows in [0, 1, 5, 200] {
            let input = batch(rows, &layout);
            let results = distances(
                WorkerPool::new(&kernel, &model, &layout)
                    .dispatch(&input, RequestKind::Distance, 3)
                    .unwrap(),
            )
            .unwrap();
            let expected: Vec<f64> = (0..rows).map(|i| (i as f64 - 0.5).abs()).collect();
            assert_eq!(results, expected, "cores {cores}, rows {rows}");
        }
    }
}

#[test]
fn worker_streams_depend_on_call_counter_only_through_seeds() {
    let model = components(control(Algorithm::BasicAbc, 10));
    let layout = ParameterLayout::from_components(&model);
    let kernel = ToyKernel { noise: 1.0 };
    let rows = batch(16, &layout);
    let pool = WorkerPool::new(&kernel, &model, &layout);

    let first = distances(pool.dispatch(&rows, RequestKind::Distance, 1).unwrap()).unwrap();
    let again = distances(pool.dispatch(&rows, RequestKind::Distance, 1).unwrap()).unwrap();
    let next = distances(pool.dispatch(&rows, RequestKind::Distance, 2).unwrap()).unwrap();

    assert_eq!(first, again);
    assert_ne!(first, next);
}

#[test]
fn worker_panic_fails_the_dispatch() {
    let model = components(control(Algorithm::BasicAbc, 10));
    let layout = ParameterLayout::from_components(&model);
    let kernel = PanickingKernel { row: 5 };
    let err = WorkerPool::new(&kernel, &model, &layout)
        .dispatch(&batch(40, &layout), RequestKind::Distance, 1)
        .unwrap_err();
    match err {
        SeirError::Dispatch(info) => {
            assert_eq!(info.code, "worker-panicked");
            assert_eq!(info.context.get("row").map(String::as_str), Some("5"));
            assert_eq!(info.context.get("worker").map(String::as_str), Some("1"));
        }
        other => panic!("expected dispatch error, got {other:?}"),
    }
}

#[test]
fn kernel_errors_carry_the_row() {
    let model = components(control(Algorithm::BasicAbc, 10));
    let layout = ParameterLayout::from_components(&model);
    let kernel = FailingKernel { row: 3 };
    let err = WorkerPool::new(&kernel, &model, &layout)
        .dispatch(&batch(8, &layout), RequestKind::Distance, 1)
        .unwrap_err();
    assert_eq!(err.info().code, "integration-failed");
    assert_eq!(err.info().context.get("row").map(String::as_str), Some("3"));
}

struct NegativeKernel;

impl SimulationKernel for NegativeKernel {
    fn simulate(
        &self,
        _request: &SimulationRequest<'_>,
        _rng: &mut RngHandle,
    ) -> Result<SimulationOutput, SeirError> {
        Ok(SimulationOutput::Distance(-1.0))
    }
}

#[test]
fn contract_violations_are_kernel_errors() {
    let model = components(control(Algorithm::BasicAbc, 10));
    let layout = ParameterLayout::from_components(&model);
    let rows = batch(2, &layout);

    let err = WorkerPool::new(&NegativeKernel, &model, &layout)
        .dispatch(&rows, RequestKind::Distance, 1)
        .unwrap_err();
    assert!(matches!(err, SeirError::Kernel(ErrorInfo { ref code, .. }) if code == "kernel-contract"));

    let err = WorkerPool::new(&ConstantKernel(1.0), &model, &layout)
        .dispatch(&rows, RequestKind::Trajectory, 1)
        .unwrap_err();
    assert_eq!(err.info().code, "kernel-contract");
}

#[test]
fn prior_batches_dispatch_end_to_end() {
    let model = components(control(Algorithm::BasicAbc, 64));
    let layout = ParameterLayout::from_components(&model);
    let prior = PriorSampler::new(&model, layout).unwrap();
    let mut rng = RngHandle::from_seed(11);
    let rows = prior.draw_batch(&mut rng, 64);

    let kernel = ToyKernel { noise: 0.0 };
    let results = distances(
        WorkerPool::new(&kernel, &model, &layout)
            .dispatch(&rows, RequestKind::Distance, 1)
            .unwrap(),
    )
    .unwrap();
    for (row, result) in rows.iter().zip(&results) {
        assert_eq!(*result, (row[0] - common::TRUE_BETA).abs());
    }
}
