use crate::cli::{Command, ProfileCommand, TaskCommand};
use crate::render;
use allowance_core::{AppContext, AvatarImage, NewProfile, NewTask, Profile, RepoState};
use anyhow::{anyhow, bail, Context, Result};
use chrono::Local;
use std::collections::HashMap;
use std::io::Write;
use std::path::Path;
use tracing::info;
use uuid::Uuid;

/// Run one user action against `ctx` and write what the user should see.
///
/// The context must already be bootstrapped. A non-empty `last_error` after
/// the action becomes the returned error.
pub async fn dispatch(ctx: &AppContext, command: Command, out: &mut impl Write) -> Result<()> {
    match command {
        Command::Status => {
            writeln!(out, "{}", render::session_line(&ctx.session.snapshot()))?;
        }
        Command::SignUp { email, password } => {
            ctx.session.set_email(email);
            ctx.session.set_password(password);
            ctx.session.sign_up().await;
            session_outcome(ctx)?;
            writeln!(out, "Check your inbox for a 6-digit code, then run `allowance verify`.")?;
        }
        Command::Verify { email, code } => {
            ctx.session.set_email(email);
            ctx.session.verify_code(code).await;
            session_outcome(ctx)?;
            writeln!(out, "{}", render::session_line(&ctx.session.snapshot()))?;
        }
        Command::SignIn { email, password } => {
            ctx.session.set_email(email);
            ctx.session.set_password(password);
            ctx.session.sign_in().await;
            session_outcome(ctx)?;
            writeln!(out, "{}", render::session_line(&ctx.session.snapshot()))?;
        }
        Command::SignOut => {
            ctx.session.sign_out().await;
            session_outcome(ctx)?;
            writeln!(out, "Signed out.")?;
        }
        Command::Profiles(command) => {
            require_session(ctx)?;
            profiles(ctx, command, out).await?;
        }
        Command::Tasks(command) => {
            require_session(ctx)?;
            tasks(ctx, command, out).await?;
        }
    }
    Ok(())
}

async fn profiles(ctx: &AppContext, command: ProfileCommand, out: &mut impl Write) -> Result<()> {
    let repo = &ctx.profiles;
    match command {
        ProfileCommand::List => repo.load().await,
        ProfileCommand::Add {
            name,
            birthdate,
            photo,
        } => {
            let mut profile = NewProfile::new(name);
            profile.birthdate = birthdate;
            if let Some(path) = photo {
                profile.avatar = Some(read_photo(&path).await?);
            }
            repo.add(profile).await;
        }
        ProfileCommand::Edit {
            id,
            name,
            birthdate,
        } => {
            let mut profile = find_profile(ctx, id).await?;
            if let Some(name) = name {
                profile.name = name;
            }
            if birthdate.is_some() {
                profile.birthdate = birthdate;
            }
            repo.update(&profile).await;
        }
        ProfileCommand::Photo { id, file } => {
            let profile = find_profile(ctx, id).await?;
            let image = read_photo(&file).await?;
            repo.upload_avatar(&profile, image).await;
        }
        ProfileCommand::Remove { id } => repo.delete(id).await,
    }

    let state = repo.snapshot();
    let today = Local::now().date_naive();
    for profile in &state.items {
        let url = repo.public_url(profile).map(|url| url.to_string());
        writeln!(out, "{}", render::profile_line(profile, today, url.as_deref()))?;
    }
    outcome(&state)
}

async fn tasks(ctx: &AppContext, command: TaskCommand, out: &mut impl Write) -> Result<()> {
    let repo = &ctx.tasks;
    let mut only_child = None;
    match command {
        TaskCommand::List { child } => {
            only_child = child;
            repo.load().await;
        }
        TaskCommand::Add {
            title,
            points,
            notes,
            due,
            child,
        } => {
            let mut task = NewTask::new(title, points);
            task.notes = notes;
            task.due_date = due;
            task.child_id = child;
            repo.add(task).await;
        }
        TaskCommand::Done { id } => repo.set_completed(id, true).await,
        TaskCommand::Undo { id } => repo.set_completed(id, false).await,
        TaskCommand::Remove { id } => repo.delete(id).await,
    }

    ctx.profiles.load().await;
    let names: HashMap<_, _> = ctx
        .profiles
        .profiles()
        .into_iter()
        .map(|profile| (profile.id, profile.name))
        .collect();
    let state = repo.snapshot();
    let shown = match only_child {
        Some(child) => repo.assigned_to(child),
        None => state.items.clone(),
    };
    for task in &shown {
        writeln!(out, "{}", render::task_line(task, &names))?;
    }
    if let Some(child) = only_child {
        writeln!(out, "Points earned: {}", repo.points_earned(child))?;
    }
    outcome(&state)
}

async fn find_profile(ctx: &AppContext, id: Uuid) -> Result<Profile> {
    ctx.profiles.load().await;
    outcome(&ctx.profiles.snapshot())?;
    ctx.profiles
        .profiles()
        .into_iter()
        .find(|profile| profile.id == id)
        .ok_or_else(|| anyhow!("no profile with id {id}"))
}

fn require_session(ctx: &AppContext) -> Result<()> {
    if !ctx.session.is_signed_in() {
        bail!("Not signed in. Run `allowance sign-in` first.");
    }
    Ok(())
}

fn session_outcome(ctx: &AppContext) -> Result<()> {
    match ctx.session.last_error() {
        Some(message) => Err(anyhow!(message)),
        None => Ok(()),
    }
}

fn outcome<T>(state: &RepoState<T>) -> Result<()> {
    match &state.last_error {
        Some(message) => Err(anyhow!(message.clone())),
        None => Ok(()),
    }
}

async fn read_photo(path: &Path) -> Result<AvatarImage> {
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("failed to read photo at {}", path.display()))?;
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase);
    let content_type = match extension.as_deref() {
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("heic") => "image/heic",
        Some("webp") => "image/webp",
        _ => bail!("unsupported photo format: {}", path.display()),
    };
    info!(path = %path.display(), bytes = bytes.len(), "read profile photo");
    Ok(AvatarImage::new(bytes, content_type))
}
