//! Envelope recording of bound responses.
//!
//! An [`EnvelopeRecorder`] holds one bound [`Response`] and keeps the
//! running minimum, maximum and absolute maximum of every component across
//! recorded steps. Nothing is written out; callers read the envelope back.

use crate::error::{Error, Result};
use crate::response::Response;
use nalgebra::DMatrix;
use tracing::trace;

/// Running min / max / abs-max of a response.
#[derive(Debug, Clone)]
pub struct EnvelopeRecorder {
    response: Response,
    delta_t: f64,
    next_time: f64,
    min: Vec<f64>,
    max: Vec<f64>,
    abs_max: Vec<f64>,
    first: bool,
}

impl EnvelopeRecorder {
    /// Track `response`, recording at most once per `delta_t` of analysis
    /// time. A `delta_t` of zero records every step.
    pub fn new(response: Response, delta_t: f64) -> Result<Self> {
        if !(delta_t.is_finite() && delta_t >= 0.0) {
            return Err(Error::Config(format!(
                "recording interval must be non-negative, got {delta_t}"
            )));
        }
        Ok(Self {
            response,
            delta_t,
            next_time: 0.0,
            min: Vec::new(),
            max: Vec::new(),
            abs_max: Vec::new(),
            first: true,
        })
    }

    /// Refresh the response through `refresh` and fold it into the envelope.
    ///
    /// Returns `false` when `time` falls before the next recording instant.
    ///
    /// ```ignore
    /// recorder.record(t, |r| truss.get_response(r))?;
    /// ```
    pub fn record<F>(&mut self, time: f64, refresh: F) -> Result<bool>
    where
        F: FnOnce(&mut Response) -> Result<()>,
    {
        if self.delta_t > 0.0 && time < self.next_time {
            return Ok(false);
        }
        refresh(&mut self.response)?;
        let values = self.response.info().values();

        if self.first || values.len() != self.min.len() {
            self.abs_max = values.iter().map(|v| v.abs()).collect();
            self.min = values.clone();
            self.max = values;
            self.first = false;
        } else {
            for (i, v) in values.into_iter().enumerate() {
                self.min[i] = self.min[i].min(v);
                self.max[i] = self.max[i].max(v);
                self.abs_max[i] = self.abs_max[i].max(v.abs());
            }
        }

        if self.delta_t > 0.0 {
            self.next_time = time + self.delta_t;
        }
        trace!(time, components = self.min.len(), "recorded envelope");
        Ok(true)
    }

    /// Forget everything recorded so far.
    pub fn restart(&mut self) {
        self.min.clear();
        self.max.clear();
        self.abs_max.clear();
        self.next_time = 0.0;
        self.first = true;
    }

    pub fn response(&self) -> &Response {
        &self.response
    }

    pub fn min(&self) -> &[f64] {
        &self.min
    }

    pub fn max(&self) -> &[f64] {
        &self.max
    }

    pub fn abs_max(&self) -> &[f64] {
        &self.abs_max
    }

    /// Envelope as a 3 x n matrix with rows min, max, abs-max.
    pub fn envelope(&self) -> DMatrix<f64> {
        let n = self.min.len();
        DMatrix::from_fn(3, n, |r, c| match r {
            0 => self.min[c],
            1 => self.max[c],
            _ => self.abs_max[c],
        })
    }
}
