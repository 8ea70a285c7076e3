mod common;

use common::{components, control};
use nalgebra::DMatrix;
use rand::Rng;
use rand_distr::{Distribution, Gamma, StandardNormal};
use seir_abc::prior::RHO_ATTEMPTS;
use seir_abc::PriorSampler;
use seir_core::{
    Algorithm, ModelComponents, ParameterLayout, ReinfectionMode, ReinfectionModel, RngHandle,
};

fn sampler() -> PriorSampler {
    let model = components(control(Algorithm::BasicAbc, 10));
    PriorSampler::new(&model, ParameterLayout::from_components(&model)).unwrap()
}

#[test]
fn draws_are_reproducible_for_a_seed() {
    let prior = sampler();
    let a = prior.draw_batch(&mut RngHandle::from_seed(5), 32);
    let b = prior.draw_batch(&mut RngHandle::from_seed(5), 32);
    let c = prior.draw_batch(&mut RngHandle::from_seed(6), 32);
    assert_eq!(a, b);
    assert_ne!(a, c);
    assert!(a.iter().all(|row| row.len() == prior.layout().len()));
}

#[test]
fn valid_draws_have_positive_finite_density() {
    let prior = sampler();
    let layout = *prior.layout();
    let batch = prior.draw_batch(&mut RngHandle::from_seed(17), 200);
    let mut valid = 0;
    for row in &batch {
        let rho_sum: f64 = row[layout.rho_range()].iter().sum();
        let density = prior.density(row);
        if rho_sum <= 1.0 {
            valid += 1;
            assert!(density > 0.0 && density.is_finite(), "row {row:?}");
        } else {
            assert_eq!(density, 0.0);
        }
        assert!(row[layout.gamma_ei_index()] > 0.0);
        assert!(row[layout.gamma_ir_index()] > 0.0);
    }
    assert!(valid > 150);
}

#[test]
fn simplex_violation_has_zero_density() {
    let prior = sampler();
    assert!(prior.density(&[0.5, 0.4, 0.5, 0.5]) > 0.0);
    assert_eq!(prior.density(&[0.5, 1.2, 0.5, 0.5]), 0.0);
    assert_eq!(prior.log_density(&[0.5, 1.2, 0.5, 0.5]), f64::NEG_INFINITY);
}

#[test]
fn out_of_support_rows_have_zero_density() {
    let prior = sampler();
    assert_eq!(prior.density(&[0.5, 0.4, -0.1, 0.5]), 0.0);
    assert_eq!(prior.density(&[0.5, -0.4, 0.5, 0.5]), 0.0);
    assert_eq!(prior.density(&[0.5, 0.4, 0.5]), 0.0);
    assert_eq!(prior.density(&[0.5, 0.4, 0.5, 0.5, 1.0]), 0.0);
}

#[test]
fn density_peaks_at_the_beta_prior_mean() {
    let prior = sampler();
    let at_mean = prior.density(&[common::TRUE_BETA, 0.4, 0.5, 0.5]);
    let away = prior.density(&[common::TRUE_BETA + 1.0, 0.4, 0.5, 0.5]);
    assert!(at_mean > away);
}

#[test]
fn reinfection_block_uses_its_own_priors() {
    let base = components(control(Algorithm::BasicAbc, 10));
    let reinfection = ReinfectionModel::new(
        ReinfectionMode::Estimated,
        DMatrix::from_element(common::TIMEPOINTS, 2, 1.0),
        vec![10.0, -10.0],
        vec![100.0, 100.0],
    )
    .unwrap();
    let model = ModelComponents::new(
        base.data,
        base.exposure,
        reinfection,
        base.distance,
        base.transition,
        base.initial,
        base.control,
    )
    .unwrap();
    let layout = ParameterLayout::from_components(&model);
    assert_eq!(layout.n_beta_rs, 2);

    let prior = PriorSampler::new(&model, layout).unwrap();
    let batch = prior.draw_batch(&mut RngHandle::from_seed(3), 50);
    for row in &batch {
        let rs = &row[layout.beta_rs_range()];
        assert!((rs[0] - 10.0).abs() < 0.1, "row {row:?}");
        assert!((rs[1] + 10.0).abs() < 0.1, "row {row:?}");
        assert!(row[0].abs() < 5.0);
    }
}

#[test]
fn tail_rows_keep_a_positive_density() {
    let prior = sampler();
    let row = [common::TRUE_BETA + 20.0, 0.4, 0.5, 0.5];
    let log_density = prior.log_density(&row);
    assert!(log_density.is_finite() && log_density < -745.0, "log density {log_density}");
    assert!(prior.is_supported(&row));
    assert!(prior.density(&row) > 0.0);
    assert!(!prior.is_supported(&[0.5, 1.2, 0.5, 0.5]));
}

#[test]
fn exhausted_simplex_attempts_keep_the_last_draw() {
    let base = components(control(Algorithm::BasicAbc, 10));
    let mut distance = base.distance;
    distance.set_prior_parameters(50.0, 1.0).unwrap();
    let model = ModelComponents::new(
        base.data,
        base.exposure,
        base.reinfection,
        distance,
        base.transition,
        base.initial,
        base.control,
    )
    .unwrap();
    let layout = ParameterLayout::from_components(&model);
    let prior = PriorSampler::new(&model, layout).unwrap();

    let batch = prior.draw_batch(&mut RngHandle::from_seed(9), 4);
    assert_eq!(batch.len(), 4);
    for row in &batch {
        let rho_sum: f64 = row[layout.rho_range()].iter().sum();
        assert!(rho_sum > 1.0, "row {row:?}");
        assert_eq!(prior.density(row), 0.0);
        assert!(row[layout.gamma_ei_index()] > 0.0);
    }
}

#[test]
fn draw_order_is_rows_then_spatial_weights() {
    let prior = sampler();
    let layout = *prior.layout();
    let batch = prior.draw_batch(&mut RngHandle::from_seed(11), 3);

    // Fixture priors: beta ~ N(0.5, 1/2), rates ~ Gamma(2, rate 4), rho ~ Beta(1, 1).
    let rate = Gamma::new(2.0, 1.0 / 4.0).unwrap();
    let rho = Gamma::new(1.0, 1.0).unwrap();
    let mut rng = RngHandle::from_seed(11);
    let mut expected = vec![vec![0.0; layout.len()]; 3];
    for row in expected.iter_mut() {
        let z: f64 = rng.sample(StandardNormal);
        row[layout.beta_range().start] = common::TRUE_BETA + z / 2.0;
        row[layout.gamma_ei_index()] = rate.sample(&mut rng);
        row[layout.gamma_ir_index()] = rate.sample(&mut rng);
    }
    for row in expected.iter_mut() {
        for _ in 0..RHO_ATTEMPTS {
            row[layout.rho_range().start] = rho.sample(&mut rng);
            if row[layout.rho_range().start] <= 1.0 {
                break;
            }
        }
    }

    assert_eq!(batch, expected);
}
