//! Simulated kiln for demos and end-to-end tests.
//!
//! Two thermal nodes: the heating element and the kiln body. The element
//! receives `p_heat * duty` watts, leaks into the body through `r_ho_noair`
//! and the body leaks to the environment through `r_o_nocool`. A
//! proportional controller tracks the profile set-point.
//!
//! Every [`SampleSource::get_state`] call advances the model by one
//! `time_step_secs` of simulated time, in one-second substeps. The poller
//! cadence is `time_step_secs / speedup` of wall time.

use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use km_common::{FiringState, Profile, StateSample};

use crate::source::{ControlError, ControlLoop, SampleSource, SourceError};

/// Width of the proportional band, in °F below the set-point.
const PROPORTIONAL_BAND_F: f64 = 20.0;
const SUBSTEP_SECS: f64 = 1.0;

/// Physical constants of the simulated kiln.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThermalParams {
    /// Ambient temperature, °C.
    pub t_env: f64,
    /// Heat capacity of the element, J/K.
    pub c_heat: f64,
    /// Heat capacity of the kiln body, J/K.
    pub c_oven: f64,
    /// Heater power, W.
    pub p_heat: f64,
    /// Thermal resistance body to environment, K/W.
    pub r_o_nocool: f64,
    /// Thermal resistance element to body, K/W.
    pub r_ho_noair: f64,
}

impl Default for ThermalParams {
    fn default() -> Self {
        Self {
            t_env: 25.0,
            c_heat: 100.0,
            c_oven: 5000.0,
            p_heat: 5450.0,
            r_o_nocool: 1.0,
            r_ho_noair: 0.1,
        }
    }
}

impl ThermalParams {
    pub fn validate(&self) -> Result<(), String> {
        let positive = [
            ("c_heat", self.c_heat),
            ("c_oven", self.c_oven),
            ("p_heat", self.p_heat),
            ("r_o_nocool", self.r_o_nocool),
            ("r_ho_noair", self.r_ho_noair),
        ];
        for (name, v) in positive {
            if !(v.is_finite() && v > 0.0) {
                return Err(format!("{name} must be positive, got {v}"));
            }
        }
        if !self.t_env.is_finite() {
            return Err("t_env must be finite".to_string());
        }
        Ok(())
    }
}

pub fn c_to_f(c: f64) -> f64 {
    c * 9.0 / 5.0 + 32.0
}

#[derive(Debug, Clone)]
struct SimState {
    t_heat: f64,
    t_oven: f64,
    runtime: f64,
    state: FiringState,
    profile: Option<Profile>,
    target_f: f64,
    duty: f64,
}

/// Kiln simulator implementing both the sample source and the control loop.
#[derive(Debug)]
pub struct SimulatedKiln {
    params: ThermalParams,
    time_step_secs: f64,
    speedup: f64,
    inner: Mutex<SimState>,
}

impl SimulatedKiln {
    pub fn new(params: ThermalParams, time_step_secs: f64, speedup: f64) -> Self {
        let ambient = params.t_env;
        Self {
            params,
            time_step_secs,
            speedup,
            inner: Mutex::new(SimState {
                t_heat: ambient,
                t_oven: ambient,
                runtime: 0.0,
                state: FiringState::Idle,
                profile: None,
                target_f: c_to_f(ambient),
                duty: 0.0,
            }),
        }
    }

    /// Current kiln body temperature in °F, without advancing the model.
    pub fn temperature_f(&self) -> f64 {
        c_to_f(self.lock().t_oven)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, SimState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn substep(&self, s: &mut SimState, dt: f64) {
        let p = &self.params;
        if s.state == FiringState::Running {
            let error = s.target_f - c_to_f(s.t_oven);
            s.duty = (error / PROPORTIONAL_BAND_F).clamp(0.0, 1.0);
        } else {
            s.duty = 0.0;
        }
        s.t_heat += p.p_heat * s.duty * dt / p.c_heat;
        let p_ho = (s.t_heat - s.t_oven) / p.r_ho_noair;
        s.t_oven += p_ho * dt / p.c_oven;
        s.t_heat -= p_ho * dt / p.c_heat;
        let p_env = (s.t_oven - p.t_env) / p.r_o_nocool;
        s.t_oven -= p_env * dt / p.c_oven;
    }

    fn advance(&self, s: &mut SimState) {
        let mut remaining = self.time_step_secs;
        while remaining > 0.0 {
            let dt = remaining.min(SUBSTEP_SECS);
            if s.state == FiringState::Running {
                if let Some(target) = s.profile.as_ref().and_then(|p| p.target_at(s.runtime)) {
                    s.target_f = target;
                }
            }
            self.substep(s, dt);
            if s.state == FiringState::Running {
                s.runtime += dt;
            }
            remaining -= dt;
        }

        let done = s
            .profile
            .as_ref()
            .is_some_and(|p| s.runtime >= p.duration());
        if s.state == FiringState::Running && done {
            info!(runtime = s.runtime, "simulated schedule complete");
            s.state = FiringState::Complete;
            s.duty = 0.0;
        }
    }
}

impl SampleSource for SimulatedKiln {
    fn get_state(&self) -> Result<StateSample, SourceError> {
        let mut s = self.lock();
        self.advance(&mut s);
        Ok(StateSample::new(s.runtime, c_to_f(s.t_oven), s.state)
            .with_target(s.target_f)
            .with_heat_output(s.duty))
    }

    fn time_step(&self) -> Duration {
        Duration::from_secs_f64((self.time_step_secs / self.speedup).max(0.0))
    }
}

impl ControlLoop for SimulatedKiln {
    fn run_profile(&self, profile: &Profile, startat_minutes: f64) -> Result<(), ControlError> {
        if profile.data.is_empty() {
            return Err(ControlError::Rejected(format!(
                "profile {} has no set-points",
                profile.name
            )));
        }
        let mut s = self.lock();
        s.profile = Some(profile.clone());
        s.runtime = (startat_minutes * 60.0).max(0.0);
        s.state = FiringState::Running;
        s.target_f = profile.target_at(s.runtime).unwrap_or(s.target_f);
        debug!(profile = %profile.name, startat_minutes, "simulated schedule started");
        Ok(())
    }

    fn abort_run(&self) -> Result<(), ControlError> {
        let mut s = self.lock();
        if s.state == FiringState::Running {
            s.state = FiringState::Aborted;
            s.duty = 0.0;
        }
        Ok(())
    }
}
