use anyhow::Result;
use easygraph_contracts::chart::ChartConfiguration;
use easygraph_contracts::chat::{Attachment, InlineFile, Message, TURN_ERROR_REPLY};
use easygraph_contracts::events::{EventLog, EventPayload};
use easygraph_contracts::projects::{Project, ProjectError, ProjectStore};
use serde_json::json;

use crate::composer::RequestComposer;
use crate::error::TransportError;
use crate::gemini::map_object;
use crate::normalize::NormalizeOutcome;

#[derive(Debug)]
pub enum TurnOutcome {
    Rendered,
    /// The reply arrived but could not be parsed; the fallback chart was used.
    Fallback { reason: String },
    TransportFailed(TransportError),
}

#[derive(Debug)]
pub struct TurnReport {
    pub reply: Message,
    pub outcome: TurnOutcome,
    pub autosaved: bool,
}

/// One conversation: its messages, the latest chart, and the saved project
/// it is attached to, if any.
pub struct EditorSession {
    composer: RequestComposer,
    store: ProjectStore,
    events: Option<EventLog>,
    messages: Vec<Message>,
    chart: Option<ChartConfiguration>,
    project_id: Option<String>,
    unsaved: bool,
}

impl EditorSession {
    pub fn new(composer: RequestComposer, store: ProjectStore) -> Self {
        Self {
            composer,
            store,
            events: None,
            messages: Vec::new(),
            chart: None,
            project_id: None,
            unsaved: false,
        }
    }

    pub fn with_events(mut self, events: EventLog) -> Self {
        if let Some(warning) = self.store.load_warning() {
            log(
                Some(&events),
                true,
                "projects_load_failed",
                json!({ "error": warning }),
            );
        }
        self.events = Some(events);
        self
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn chart(&self) -> Option<&ChartConfiguration> {
        self.chart.as_ref()
    }

    pub fn project_id(&self) -> Option<&str> {
        self.project_id.as_deref()
    }

    pub fn current_project(&self) -> Option<&Project> {
        self.project_id
            .as_deref()
            .and_then(|id| self.store.get(id))
    }

    pub fn has_unsaved_changes(&self) -> bool {
        self.unsaved
    }

    pub fn store(&self) -> &ProjectStore {
        &self.store
    }

    pub fn composer(&self) -> &RequestComposer {
        &self.composer
    }

    /// Runs one turn. Transport failures become an apology reply in the
    /// transcript; only persistence failures are returned as errors.
    pub fn send(&mut self, text: &str, attachments: Vec<Attachment>) -> Result<TurnReport> {
        self.unsaved = true;
        let files: Vec<InlineFile> = attachments.iter().map(Attachment::inline_file).collect();
        let history = self.messages.clone();
        self.messages.push(Message::user(text, attachments));

        let (reply, outcome) = match self.composer.generate_normalized(text, &files, &history) {
            Ok(normalized) => {
                let outcome = match normalized.outcome {
                    NormalizeOutcome::Parsed => TurnOutcome::Rendered,
                    NormalizeOutcome::Fallback { reason, .. } => TurnOutcome::Fallback { reason },
                };
                let response = normalized.response;
                self.chart = Some(response.chart_config.clone());
                let reply = Message::assistant_with_chart(
                    response.summary,
                    response.chart_config,
                    response.extracted_data,
                );
                (reply, outcome)
            }
            Err(err) => (
                Message::assistant(TURN_ERROR_REPLY),
                TurnOutcome::TransportFailed(err),
            ),
        };
        self.messages.push(reply.clone());
        let autosaved = self.autosave()?;

        Ok(TurnReport {
            reply,
            outcome,
            autosaved,
        })
    }

    fn autosave(&mut self) -> Result<bool> {
        let Some(id) = self.project_id.clone() else {
            return Ok(false);
        };
        if self
            .store
            .update(&id, &self.messages, self.chart.as_ref())?
        {
            self.unsaved = false;
            return Ok(true);
        }
        self.project_id = None;
        Ok(false)
    }

    /// Saves under `name`, replacing the attached project when there is one.
    pub fn save_as(&mut self, name: &str) -> Result<Project> {
        let project = self.store.save(
            name,
            self.project_id.as_deref(),
            self.messages.clone(),
            self.chart.clone(),
        )?;
        self.project_id = Some(project.id.clone());
        self.unsaved = false;
        self.log_info(
            "project_saved",
            json!({ "project_id": project.id, "name": project.name }),
        );
        Ok(project)
    }

    pub fn load(&mut self, id: &str) -> Result<&Project> {
        let Some(project) = self.store.get(id) else {
            return Err(ProjectError::NotFound { id: id.to_string() }.into());
        };
        self.messages = project.messages.clone();
        self.chart = project.chart_config.clone();
        self.project_id = Some(project.id.clone());
        self.unsaved = false;
        Ok(project)
    }

    pub fn start_new(&mut self) {
        self.messages.clear();
        self.chart = None;
        self.project_id = None;
        self.unsaved = false;
    }

    /// Deleting the attached project detaches the session but keeps its
    /// conversation on screen.
    pub fn delete(&mut self, id: &str) -> Result<bool> {
        let removed = self.store.delete(id)?;
        if removed {
            if self.project_id.as_deref() == Some(id) {
                self.project_id = None;
            }
            self.log_info("project_deleted", json!({ "project_id": id }));
        }
        Ok(removed)
    }

    pub fn rename(&mut self, id: &str, name: &str) -> Result<()> {
        self.store.rename(id, name)
    }

    fn log_info(&self, event_type: &str, payload: serde_json::Value) {
        log(self.events.as_ref(), false, event_type, payload);
    }
}

fn log(events: Option<&EventLog>, warn: bool, event_type: &str, payload: serde_json::Value) {
    let Some(events) = events else {
        return;
    };
    let payload: EventPayload = map_object(payload);
    let result = if warn {
        events.warn(event_type, payload)
    } else {
        events.info(event_type, payload)
    };
    if let Err(err) = result {
        eprintln!("easygraph: failed to record {event_type} event: {err:#}");
    }
}
