//! Drives an `EmissionsController` through a scenario on a manual clock and a
//! mock ledger, recording what each step did.

use crate::scenario::{parse_fraction, Scenario, Step};
use anyhow::{anyhow, Context, Result};
use emissions_controller::{
    AllocationEntry, ControllerSnapshot, DistributionReport, EmissionsController, EmissionsEvent,
    EmissionsParams, EpochState, MockRewardLedger, PendingTransfer, RetryReport, RewardLedger,
    StaticPowerSource, VotingPowerSource,
};
use emissions_types::{units, Amount, DialId, ManualClock, Power, RecipientId, VoterId};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{info, warn};

/// What a single step did.
#[derive(Debug, Clone, Serialize)]
pub struct StepRecord {
    pub step: usize,
    pub action: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub distribution: Option<DistributionReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry: Option<RetryReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DialSummary {
    pub dial: DialId,
    pub label: String,
    pub enabled: bool,
    #[serde(with = "emissions_types::amount_str")]
    pub weighted_votes: Power,
    #[serde(with = "emissions_types::amount_str")]
    pub cumulative_distributed: Amount,
    /// Balance credited on the simulated ledger
    #[serde(with = "emissions_types::amount_str")]
    pub balance: Amount,
}

#[derive(Debug, Clone, Serialize)]
pub struct SimulationOutput {
    pub params: EmissionsParams,
    pub steps: Vec<StepRecord>,
    pub epoch: EpochState,
    pub dials: Vec<DialSummary>,
    pub pending: Vec<PendingTransfer>,
    pub events: Vec<EmissionsEvent>,
    /// Final controller state, written out on request
    #[serde(skip)]
    pub snapshot: ControllerSnapshot,
}

pub struct Simulation {
    controller: EmissionsController,
    sources: BTreeMap<String, Arc<StaticPowerSource>>,
    clock: Arc<ManualClock>,
    ledger: MockRewardLedger,
    labels: BTreeMap<RecipientId, String>,
}

impl Simulation {
    /// Build the controller, sources and initial dial set for `scenario`.
    pub fn new(params: EmissionsParams, scenario: &Scenario) -> Result<Self> {
        let mut sources = BTreeMap::new();
        let mut ordered: Vec<Arc<dyn VotingPowerSource>> = Vec::new();
        for declared in &scenario.sources {
            let source = Arc::new(StaticPowerSource::with_powers(
                declared.name.clone(),
                declared
                    .powers
                    .iter()
                    .map(|(voter, power)| (VoterId::from_label(voter), units(*power as u128))),
            ));
            ordered.push(source.clone());
            sources.insert(declared.name.clone(), source);
        }

        let clock = Arc::new(ManualClock::new(scenario.start_time));
        let controller = EmissionsController::new(params, ordered, clock.clone())
            .context("failed to create emissions controller")?;

        let mut labels = BTreeMap::new();
        let recipients: Vec<_> = scenario
            .dials
            .iter()
            .map(|label| {
                let recipient = RecipientId::from_label(label);
                labels.insert(recipient, label.clone());
                recipient
            })
            .collect();
        controller
            .initialize(&recipients)
            .context("failed to register initial dials")?;

        Ok(Self {
            controller,
            sources,
            clock,
            ledger: MockRewardLedger::new(),
            labels,
        })
    }

    /// Run every step in order. With `strict` the first failing step aborts the
    /// run; otherwise the failure is recorded and the run continues.
    pub fn run(mut self, steps: &[Step], strict: bool) -> Result<SimulationOutput> {
        let mut records = Vec::with_capacity(steps.len());
        for (index, step) in steps.iter().enumerate() {
            let mut record = StepRecord {
                step: index,
                action: action_name(step),
                distribution: None,
                retry: None,
                error: None,
            };
            if let Err(err) = self.apply(step, &mut record) {
                if strict {
                    return Err(err.context(format!("step {index} ({}) failed", record.action)));
                }
                let message = format!("{err:#}");
                warn!(step = index, action = record.action, error = %message, "scenario step failed");
                record.error = Some(message);
            }
            records.push(record);
        }
        Ok(self.finish(records))
    }

    fn apply(&mut self, step: &Step, record: &mut StepRecord) -> Result<()> {
        match step {
            Step::Vote { voter, entries } => {
                let entries = entries
                    .iter()
                    .map(|entry| {
                        Ok(AllocationEntry::new(
                            DialId(entry.dial),
                            parse_fraction(&entry.fraction)?,
                        ))
                    })
                    .collect::<Result<Vec<_>>>()?;
                self.controller
                    .set_voter_weights(VoterId::from_label(voter), entries)?;
            }
            Step::SetPower {
                source,
                voter,
                power,
            } => {
                let source = self
                    .sources
                    .get(source)
                    .ok_or_else(|| anyhow!("unknown power source '{source}'"))?;
                source.set_power(VoterId::from_label(voter), units(*power as u128));
            }
            Step::Advance { epochs, secs } => {
                let mut delta = epochs
                    .saturating_mul(self.controller.params().epoch_duration_secs)
                    .saturating_add(*secs);
                if delta == 0 {
                    delta = self.controller.params().epoch_duration_secs;
                }
                let now = self.clock.advance(delta);
                info!(now, delta, "clock advanced");
            }
            Step::Distribute => {
                record.distribution = Some(self.controller.distribute_rewards(&mut self.ledger)?);
            }
            Step::Retry => {
                record.retry = Some(self.controller.retry_pending_transfers(&mut self.ledger)?);
            }
            Step::AddDial { recipient } => {
                let id = RecipientId::from_label(recipient);
                self.controller.add_dial(id)?;
                self.labels.insert(id, recipient.clone());
            }
            Step::DisableDial { dial } => {
                self.controller.disable_dial(DialId(*dial))?;
            }
            Step::Reject { recipient } => {
                self.ledger.reject(RecipientId::from_label(recipient));
            }
            Step::Accept { recipient } => {
                self.ledger.accept(&RecipientId::from_label(recipient));
            }
        }
        Ok(())
    }

    fn finish(self, steps: Vec<StepRecord>) -> SimulationOutput {
        let dials = self
            .controller
            .dials()
            .into_iter()
            .map(|dial| DialSummary {
                dial: dial.id,
                label: self
                    .labels
                    .get(&dial.recipient)
                    .cloned()
                    .unwrap_or_else(|| dial.recipient.to_string()),
                enabled: dial.enabled,
                weighted_votes: dial.weighted_votes,
                cumulative_distributed: dial.cumulative_distributed,
                balance: self.ledger.balance_of(&dial.recipient),
            })
            .collect();

        SimulationOutput {
            params: self.controller.params().clone(),
            steps,
            epoch: self.controller.epoch_state(),
            dials,
            pending: self.controller.pending_transfers(),
            events: self.controller.drain_events(),
            snapshot: self.controller.snapshot(),
        }
    }
}

fn action_name(step: &Step) -> &'static str {
    match step {
        Step::Vote { .. } => "vote",
        Step::SetPower { .. } => "set_power",
        Step::Advance { .. } => "advance",
        Step::Distribute => "distribute",
        Step::Retry => "retry",
        Step::AddDial { .. } => "add_dial",
        Step::DisableDial { .. } => "disable_dial",
        Step::Reject { .. } => "reject",
        Step::Accept { .. } => "accept",
    }
}
