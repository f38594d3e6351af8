//! Process-wide values shared by every entity during one assembly pass.
//!
//! The kernel passes a `&ProcessInfo` into every entity call. Strategies and
//! schemes mutate it only between passes, which the borrow checker enforces:
//! a build holds a shared borrow of the whole model part.

use std::collections::BTreeMap;

pub const TIME: &str = "TIME";
pub const DELTA_TIME: &str = "DELTA_TIME";
pub const STEP: &str = "STEP";
pub const NL_ITERATION_NUMBER: &str = "NL_ITERATION_NUMBER";
pub const IS_RESTARTED: &str = "IS_RESTARTED";
/// Set by arc-length strategies so load-aware entities can report it.
pub const LOAD_FACTOR: &str = "LOAD_FACTOR";

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ProcessValue {
    Real(f64),
    Integer(i64),
    Flag(bool),
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ProcessInfo {
    values: BTreeMap<&'static str, ProcessValue>,
    previous: Option<Box<ProcessInfo>>,
}

impl ProcessInfo {
    pub fn new() -> Self {
        let mut info = Self::default();
        info.set_real(TIME, 0.0);
        info.set_real(DELTA_TIME, 0.0);
        info.set_integer(STEP, 0);
        info.set_integer(NL_ITERATION_NUMBER, 0);
        info
    }

    pub fn set(&mut self, key: &'static str, value: ProcessValue) {
        self.values.insert(key, value);
    }

    pub fn get(&self, key: &str) -> Option<ProcessValue> {
        self.values.get(key).copied()
    }

    pub fn set_real(&mut self, key: &'static str, value: f64) {
        self.set(key, ProcessValue::Real(value));
    }

    pub fn set_integer(&mut self, key: &'static str, value: i64) {
        self.set(key, ProcessValue::Integer(value));
    }

    pub fn set_flag(&mut self, key: &'static str, value: bool) {
        self.set(key, ProcessValue::Flag(value));
    }

    pub fn real(&self, key: &str) -> Option<f64> {
        match self.get(key)? {
            ProcessValue::Real(v) => Some(v),
            ProcessValue::Integer(v) => Some(v as f64),
            ProcessValue::Flag(_) => None,
        }
    }

    pub fn integer(&self, key: &str) -> Option<i64> {
        match self.get(key)? {
            ProcessValue::Integer(v) => Some(v),
            _ => None,
        }
    }

    pub fn flag(&self, key: &str) -> bool {
        matches!(self.get(key), Some(ProcessValue::Flag(true)))
    }

    pub fn time(&self) -> f64 {
        self.real(TIME).unwrap_or(0.0)
    }

    pub fn delta_time(&self) -> f64 {
        self.real(DELTA_TIME).unwrap_or(0.0)
    }

    pub fn step(&self) -> i64 {
        self.integer(STEP).unwrap_or(0)
    }

    pub fn iteration(&self) -> usize {
        self.integer(NL_ITERATION_NUMBER).unwrap_or(0).max(0) as usize
    }

    pub fn set_iteration(&mut self, iteration: usize) {
        self.set_integer(NL_ITERATION_NUMBER, iteration as i64);
    }

    /// Values of the last step before the most recent `clone_time_step`.
    pub fn previous(&self) -> Option<&ProcessInfo> {
        self.previous.as_deref()
    }

    /// Keep a one-deep snapshot and advance time, delta time and step.
    pub fn clone_time_step(&mut self, new_time: f64) {
        let mut snapshot = self.clone();
        snapshot.previous = None;
        let delta = new_time - self.time();
        self.previous = Some(Box::new(snapshot));
        self.set_real(TIME, new_time);
        self.set_real(DELTA_TIME, delta);
        self.set_integer(STEP, self.step() + 1);
    }
}
