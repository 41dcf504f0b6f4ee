//! Built-in sensor client
//!
//! Publishes a `counter` Input and reads its sampling interval from a
//! `period` Output. Sampling does not start until a period arrives, either
//! from a stored default or from an administrative push.

use anyhow::{ensure, Result};
use datahub_core::{Created, DataType, Hub, HubError, SampleValue, Session, SessionId};
use std::cell::Cell;
use std::rc::Rc;
use std::time::Duration;
use tracing::{info, warn};

const COUNTER: &str = "counter";
const PERIOD: &str = "period";

pub struct SensorClient {
    session: Session,
    period: Rc<Cell<f64>>,
    counter: f64,
}

impl SensorClient {
    /// Bind to `/app/<app>` and create the sensor's resources
    pub fn start(hub: &mut Hub, app: &str) -> Result<Self> {
        let mut session = Session::new();
        let app_name = app.to_string();
        let identity = move |_: SessionId| -> datahub_core::Result<String> { Ok(app_name.clone()) };
        hub.client_namespace(&mut session, &identity)?;

        hub.create_input(&session, COUNTER, DataType::Numeric, "count")?;
        hub.create_output(&session, PERIOD, DataType::Numeric, "s")?;

        let period = Rc::new(Cell::new(0.0));
        hub.add_push_handler(
            &session,
            PERIOD,
            |_: &mut Hub, timestamp: f64, value: &SampleValue, period: &mut Rc<Cell<f64>>| {
                match value.as_numeric() {
                    Some(secs) => {
                        info!(value = secs, timestamp, "Received update to 'period' setting");
                        period.set(secs);
                    }
                    None => warn!(value = %value, "Ignoring non-numeric period"),
                }
            },
            period.clone(),
        )?;

        info!(session = %session.id(), app = %app, "Sensor client started");
        Ok(Self {
            session,
            period,
            counter: 0.0,
        })
    }

    /// Sampling interval, once a usable period has been received
    pub fn period(&self) -> Option<Duration> {
        let secs = self.period.get();
        (secs.is_finite() && secs > 0.0).then(|| Duration::from_secs_f64(secs))
    }

    pub fn count(&self) -> f64 {
        self.counter
    }

    /// Take one sample
    pub fn tick(&mut self, hub: &mut Hub) -> Result<()> {
        self.counter += 1.0;
        hub.push_input(&self.session, COUNTER, 0.0, SampleValue::Numeric(self.counter))?;
        if self.counter == 3.0 {
            self.check_create_delete(hub)?;
        }
        Ok(())
    }

    /// Exercise the create/delete rules against the live hub
    fn check_create_delete(&self, hub: &mut Hub) -> Result<()> {
        info!("Running create/delete checks");
        let s = &self.session;

        let conflicts = [
            hub.create_input(s, COUNTER, DataType::String, "count"),
            hub.create_input(s, COUNTER, DataType::Numeric, "s"),
            hub.create_output(s, COUNTER, DataType::Numeric, "count"),
        ];
        for result in conflicts {
            ensure!(
                matches!(result, Err(HubError::Duplicate(_))),
                "conflicting create returned {:?}",
                result
            );
        }

        let same = hub.create_input(s, COUNTER, DataType::Numeric, "count")?;
        ensure!(same == Created::Existing, "identical create returned {:?}", same);

        hub.delete_resource(s, COUNTER)?;
        let recreated = hub.create_input(s, COUNTER, DataType::Numeric, "count")?;
        ensure!(recreated == Created::Fresh, "re-create returned {:?}", recreated);

        info!("Create/delete checks passed");
        Ok(())
    }

    pub fn stop(mut self, hub: &mut Hub) {
        info!(session = %self.session.id(), samples = self.counter, "Sensor client stopped");
        hub.end_session(&mut self.session);
    }
}
