use allowance_core::{Profile, SessionPhase, SessionState, Task};
use chrono::NaiveDate;
use std::collections::HashMap;
use uuid::Uuid;

pub fn session_line(state: &SessionState) -> String {
    let phase = match state.phase() {
        SessionPhase::Unknown => "session not checked yet",
        SessionPhase::SignedOut => "signed out",
        SessionPhase::AwaitingVerification => "waiting for the emailed code",
        SessionPhase::SignedIn => "signed in",
    };
    let mut line = if state.email.is_empty() {
        phase.to_string()
    } else {
        format!("{phase} ({})", state.email)
    };
    if state.is_verified {
        line.push_str(", email verified");
    }
    line
}

pub fn profile_line(profile: &Profile, today: NaiveDate, photo: Option<&str>) -> String {
    let mut line = format!("{}  {}", profile.id, profile.name);
    if let Some(age) = profile.age_on(today) {
        line.push_str(&format!(", {age} yrs"));
    }
    if let Some(url) = photo {
        line.push_str(&format!("  [{url}]"));
    }
    line
}

pub fn task_line(task: &Task, child_names: &HashMap<Uuid, String>) -> String {
    let mark = if task.is_completed { "[x]" } else { "[ ]" };
    let mut line = format!("{mark} {}  {} ({} pts)", task.id, task.title, task.points);
    if let Some(child) = task.child_id {
        let name = child_names
            .get(&child)
            .map(String::as_str)
            .unwrap_or("unknown child");
        line.push_str(&format!(" for {name}"));
    }
    if let Some(due) = task.due_date {
        line.push_str(&format!(", due {due}"));
    }
    if let Some(notes) = task.notes.as_deref().filter(|notes| !notes.is_empty()) {
        line.push_str(&format!(" - {notes}"));
    }
    line
}
