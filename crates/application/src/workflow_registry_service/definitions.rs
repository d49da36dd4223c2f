use std::collections::HashSet;

use chrono::{DateTime, Utc};

use super::*;

impl WorkflowRegistryService {
    /// Reconciles code-managed definitions with the registry.
    ///
    /// New definitions are registered as CODE, existing workflows adopt the
    /// code definition, and CODE workflows whose definition disappeared fall
    /// back to MANUAL. Nothing is released when any definition failed to load
    /// or sync, since a missing definition may only be unreadable.
    pub async fn sync_definitions(&self) -> AppResult<DefinitionSyncSummary> {
        let Some(source) = &self.definition_source else {
            return Err(AppError::Conflict(
                "no workflow definition source is configured".to_owned(),
            ));
        };

        let listing = source.list_definitions().await?;
        let mut summary = DefinitionSyncSummary {
            errors: listing.errors,
            ..DefinitionSyncSummary::default()
        };
        let mut seen = HashSet::new();
        let now = self.clock.now();

        for definition in listing.definitions {
            let label = definition.dataset.clone();
            let result: AppResult<()> = async {
                let dataset = DatasetName::new(definition.dataset.as_str())?;
                seen.insert(dataset.clone());

                match self.repository.find_workflow(&dataset).await? {
                    Some(mut workflow) => {
                        if workflow.status() == WorkflowStatus::Disabled {
                            return Ok(());
                        }

                        let schedule =
                            ScheduleDescriptor::new(definition.cron, definition.timezone)?;
                        if workflow.adopt_code_definition(
                            schedule,
                            Some(definition.artifact_location),
                            now,
                        )? {
                            self.repository.update_workflow(workflow.clone()).await?;
                            self.publish_schedule(&workflow).await;
                            summary.updated += 1;
                        }
                    }
                    None => {
                        let workflow = Workflow::register(
                            WorkflowRegistration {
                                dataset: definition.dataset,
                                source_type: WorkflowSourceType::Code,
                                owner_team: definition.owner_team,
                                external_id: definition.external_id,
                                cron: definition.cron,
                                timezone: definition.timezone,
                                artifact_location: Some(definition.artifact_location),
                            },
                            now,
                        )?;
                        self.repository.insert_workflow(workflow.clone()).await?;
                        self.publish_schedule(&workflow).await;
                        summary.created += 1;
                    }
                }

                Ok(())
            }
            .await;

            if let Err(error) = result {
                warn!(definition = %label, error = %error, "failed to sync workflow definition");
                summary.errors.push(format!("{label}: {error}"));
            }
        }

        if summary.errors.is_empty() {
            self.release_missing_definitions(&seen, now, &mut summary).await?;
        } else {
            warn!(
                errors = summary.errors.len(),
                "definition errors reported, skipping release of missing code workflows"
            );
        }

        info!(
            created = summary.created,
            updated = summary.updated,
            released = summary.released,
            errors = summary.errors.len(),
            "workflow definitions synced"
        );

        Ok(summary)
    }

    async fn release_missing_definitions(
        &self,
        seen: &HashSet<DatasetName>,
        now: DateTime<Utc>,
        summary: &mut DefinitionSyncSummary,
    ) -> AppResult<()> {
        for mut workflow in self.repository.list_workflows().await? {
            if workflow.source_type() != WorkflowSourceType::Code
                || seen.contains(workflow.dataset())
            {
                continue;
            }

            if workflow.release_code_definition(now) {
                match self.repository.update_workflow(workflow.clone()).await {
                    Ok(()) => summary.released += 1,
                    Err(error) => {
                        summary
                            .errors
                            .push(format!("{}: {error}", workflow.dataset()));
                    }
                }
            }
        }

        Ok(())
    }
}
