use std::sync::Arc;

use anyhow::{bail, Context};
use chrono::{DateTime, NaiveDate, Utc};
use colored::Colorize;
use serde::Serialize;

use kiln_blob::{FsBlobConfig, FsBlobStore};
use kiln_lifecycle::{DeleteReport, LifecycleCoordinator};
use kiln_store::{Entity, EntityStore};
use kiln_types::{
    ClayBody, EntityId, Firing, Glaze, Media, MediaOwner, NewPiece, Piece, PiecePatch,
    RecipeLine, StageEvent, Timestamp,
};

use crate::cli::*;
use crate::config::KilnConfig;

pub fn run_command(cli: Cli, config: KilnConfig) -> anyhow::Result<()> {
    let kiln = open(&config)?;
    let out = Output { format: cli.format };
    match cli.command {
        Command::Piece(args) => cmd_piece(&kiln, out, args.action),
        Command::Photo(args) => cmd_photo(&kiln, out, args.action),
        Command::Glaze(args) => cmd_glaze(&kiln, out, args.action),
        Command::Clay(args) => cmd_clay(&kiln, out, args.action),
        Command::Firing(args) => cmd_firing(&kiln, out, args.action),
        Command::Board(args) => cmd_board(&kiln, out, args),
        Command::Gc(_) => cmd_gc(&kiln, out),
        Command::Fsck(_) => cmd_fsck(&kiln, out),
    }
}

fn open(config: &KilnConfig) -> anyhow::Result<LifecycleCoordinator> {
    std::fs::create_dir_all(&config.data_dir)
        .with_context(|| format!("creating {}", config.data_dir.display()))?;
    let store = EntityStore::open(config.store_path()).context("opening record store")?;
    let blobs = FsBlobStore::open(
        config.photos_path(),
        FsBlobConfig {
            extension: config.photo_extension.clone(),
            sync_on_write: config.sync_on_write,
        },
    )
    .context("opening photo directory")?;
    tracing::debug!(
        store = %config.store_path().display(),
        photos = %config.photos_path().display(),
        "studio opened"
    );
    Ok(LifecycleCoordinator::new(Arc::new(store), Arc::new(blobs)))
}

#[derive(Clone, Copy)]
struct Output {
    format: OutputFormat,
}

impl Output {
    /// Print `value` as JSON, or hand it to `text` for the human form.
    fn emit<T: Serialize>(&self, value: &T, text: impl FnOnce(&T)) -> anyhow::Result<()> {
        match self.format {
            OutputFormat::Json => println!("{}", serde_json::to_string_pretty(value)?),
            OutputFormat::Text => text(value),
        }
        Ok(())
    }
}

// ---- ids and dates ----

/// Resolve a full id or a unique id prefix against the records of type `T`.
fn resolve<T: Entity>(kiln: &LifecycleCoordinator, input: &str) -> anyhow::Result<EntityId> {
    if let Ok(id) = input.parse::<EntityId>() {
        return Ok(id);
    }
    let ids: Vec<EntityId> = kiln
        .store()
        .all::<T>()?
        .iter()
        .map(|record| record.entity_id())
        .collect();
    match_prefix(&ids, input).with_context(|| format!("resolving {} '{input}'", T::KIND))
}

fn match_prefix(ids: &[EntityId], prefix: &str) -> anyhow::Result<EntityId> {
    let prefix = prefix.trim().to_ascii_lowercase();
    if prefix.is_empty() {
        bail!("empty id");
    }
    let mut matches = ids.iter().filter(|id| id.to_string().starts_with(&prefix));
    match (matches.next(), matches.next()) {
        (Some(id), None) => Ok(*id),
        (None, _) => bail!("no match"),
        (Some(_), Some(_)) => bail!("ambiguous prefix"),
    }
}

fn resolve_opt<T: Entity>(
    kiln: &LifecycleCoordinator,
    input: Option<&str>,
) -> anyhow::Result<Option<EntityId>> {
    input.map(|s| resolve::<T>(kiln, s)).transpose()
}

fn resolve_owner(kiln: &LifecycleCoordinator, owner: &OwnerArgs) -> anyhow::Result<MediaOwner> {
    if let Some(piece) = &owner.piece {
        return Ok(MediaOwner::Piece(resolve::<Piece>(kiln, piece)?));
    }
    if let Some(glaze) = &owner.glaze {
        return Ok(MediaOwner::Glaze(resolve::<Glaze>(kiln, glaze)?));
    }
    if let Some(firing) = &owner.firing {
        return Ok(MediaOwner::Firing(resolve::<Firing>(kiln, firing)?));
    }
    bail!("one of --piece, --glaze or --firing is required")
}

/// Accepts an RFC 3339 timestamp or a bare `YYYY-MM-DD` (read as noon UTC).
fn parse_date(input: &str) -> anyhow::Result<Timestamp> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(input) {
        return Ok(ts.with_timezone(&Utc));
    }
    let date = NaiveDate::parse_from_str(input, "%Y-%m-%d")
        .with_context(|| format!("invalid date '{input}'"))?;
    match date.and_hms_opt(12, 0, 0) {
        Some(noon) => Ok(noon.and_utc()),
        None => bail!("invalid date '{input}'"),
    }
}

fn or_dash(value: Option<&str>) -> &str {
    value.unwrap_or("-")
}

// ---- piece ----

#[derive(Serialize)]
struct PieceView<'a> {
    #[serde(flatten)]
    piece: &'a Piece,
    photos: &'a [Media],
}

fn cmd_piece(kiln: &LifecycleCoordinator, out: Output, action: PieceAction) -> anyhow::Result<()> {
    match action {
        PieceAction::Add {
            name,
            clay,
            clay_body,
            glaze,
            form,
            notes,
        } => {
            let piece = kiln.create_piece(NewPiece {
                clay_body_name: clay,
                clay_body: resolve_opt::<ClayBody>(kiln, clay_body.as_deref())?,
                glaze: resolve_opt::<Glaze>(kiln, glaze.as_deref())?,
                intended_form: form,
                notes,
                ..NewPiece::named(name)
            })?;
            out.emit(&piece, |p| {
                println!("{} Created piece {} {}", "✓".green().bold(), p.name.bold(), p.id.short_id().dimmed());
                println!("  Stage: {}", p.current_stage().to_string().cyan());
            })
        }
        PieceAction::List { stage } => {
            let mut pieces = match stage {
                Some(stage) => kiln.store().query::<Piece>(|p| p.current_stage() == stage)?,
                None => kiln.store().all::<Piece>()?,
            };
            pieces.sort_by(|a, b| a.name.cmp(&b.name));
            out.emit(&pieces, |pieces| {
                if pieces.is_empty() {
                    println!("No pieces.");
                }
                for p in pieces {
                    println!(
                        "{}  {:<24} {:<14} {} photos",
                        p.id.short_id().yellow(),
                        p.name,
                        p.current_stage().to_string().cyan(),
                        p.media.len()
                    );
                }
            })
        }
        PieceAction::Show { piece } => {
            let id = resolve::<Piece>(kiln, &piece)?;
            let piece = kiln.store().get::<Piece>(id)?;
            let photos = kiln.photos(MediaOwner::Piece(id))?;
            let view = PieceView {
                piece: &piece,
                photos: &photos,
            };
            out.emit(&view, |v| print_piece(v.piece, v.photos))
        }
        PieceAction::Advance {
            piece,
            stage,
            date,
            note,
        } => {
            let id = resolve::<Piece>(kiln, &piece)?;
            let stage = match stage {
                Some(stage) => stage,
                None => match kiln.next_stage(id)? {
                    Some(next) => next,
                    None => bail!("piece is already at the final stage; name a stage to record"),
                },
            };
            let date = date.as_deref().map(parse_date).transpose()?.unwrap_or_else(Utc::now);
            let event = kiln.advance_stage(id, stage, date, note)?;
            let current = kiln.current_stage(id)?;
            out.emit(&event, |e| {
                println!("{} Recorded {} on {}", "✓".green().bold(), e.stage.to_string().cyan(), e.date.format("%Y-%m-%d"));
                if current != e.stage {
                    println!("  {} current stage is still {} (a later event exists)", "note:".yellow(), current);
                }
            })
        }
        PieceAction::Move { piece, stage, note } => {
            let id = resolve::<Piece>(kiln, &piece)?;
            let moved = kiln.move_to_stage(id, stage, note)?;
            out.emit(&moved, |moved| match moved {
                Some(e) => println!("{} Moved to {}", "✓".green().bold(), e.stage.to_string().cyan()),
                None => println!("Already at {}.", stage.to_string().cyan()),
            })
        }
        PieceAction::Edit {
            piece,
            name,
            clay,
            glaze,
            form,
            notes,
        } => {
            let id = resolve::<Piece>(kiln, &piece)?;
            let patch = PiecePatch {
                name,
                clay_body_name: clay.map(Some),
                glaze: resolve_opt::<Glaze>(kiln, glaze.as_deref())?.map(Some),
                intended_form: form.map(Some),
                notes: notes.map(Some),
                ..Default::default()
            };
            if patch.is_empty() {
                bail!("nothing to change");
            }
            let piece = kiln.update_piece(id, &patch)?;
            out.emit(&piece, |p| println!("{} Updated {}", "✓".green().bold(), p.name.bold()))
        }
        PieceAction::Unstage { event } => {
            let id = resolve::<StageEvent>(kiln, &event)?;
            let owner = kiln.store().stage_owner(id)?;
            let report = kiln.delete_stage_event(id)?;
            out.emit(&report, |r| print_delete("stage event", r))?;
            if let (Some(owner), OutputFormat::Text) = (owner, out.format) {
                let piece = kiln.store().get::<Piece>(owner)?;
                if piece.stages.is_empty() {
                    println!("{} has no stage history left", piece.name);
                } else {
                    println!("{} is now {}", piece.name, piece.current_stage());
                }
            }
            Ok(())
        }
        PieceAction::Rm { piece } => {
            let id = resolve::<Piece>(kiln, &piece)?;
            let report = kiln.delete_piece(id)?;
            out.emit(&report, |r| print_delete("piece", r))
        }
    }
}

fn print_piece(piece: &Piece, photos: &[Media]) {
    println!("{} {}", piece.name.bold(), piece.id.to_string().dimmed());
    println!("  Stage: {}", piece.current_stage().to_string().cyan());
    println!("  Clay:  {}", or_dash(piece.clay_body_name.as_deref()));
    println!("  Form:  {}", or_dash(piece.intended_form.as_deref()));
    if let Some(notes) = &piece.notes {
        println!("  Notes: {notes}");
    }
    println!("  History:");
    let mut history: Vec<&StageEvent> = piece.stages.iter().collect();
    history.sort_by_key(|e| e.date);
    for e in history {
        println!(
            "    {}  {:<14} {}  {}",
            e.id.short_id().yellow(),
            e.stage.to_string(),
            e.date.format("%Y-%m-%d %H:%M"),
            or_dash(e.note.as_deref()).dimmed()
        );
    }
    if !photos.is_empty() {
        println!("  Photos:");
        for m in photos {
            print_photo(m);
        }
    }
}

// ---- photo ----

fn cmd_photo(kiln: &LifecycleCoordinator, out: Output, action: PhotoAction) -> anyhow::Result<()> {
    match action {
        PhotoAction::Attach {
            file,
            owner,
            caption,
            stage,
        } => {
            let bytes = std::fs::read(&file).with_context(|| format!("reading {}", file.display()))?;
            let media = match resolve_owner(kiln, &owner)? {
                MediaOwner::Piece(piece) => kiln.attach_piece_photo(piece, &bytes, caption, stage)?,
                other => kiln.attach_photo(other, &bytes, caption, stage)?,
            };
            out.emit(&media, |m| {
                println!("{} Attached {} ({} bytes)", "✓".green().bold(), m.file_name.yellow(), bytes.len());
            })
        }
        PhotoAction::List { owner, stage } => {
            let photos = match (resolve_owner(kiln, &owner)?, stage) {
                (MediaOwner::Piece(piece), Some(stage)) => kiln.photos_at_stage(piece, stage)?,
                (_, Some(_)) => bail!("--stage only applies to piece photos"),
                (owner, None) => kiln.photos(owner)?,
            };
            out.emit(&photos, |photos| {
                if photos.is_empty() {
                    println!("No photos.");
                }
                for m in photos {
                    print_photo(m);
                }
            })
        }
        PhotoAction::Export { photo, out: path } => {
            let id = resolve::<Media>(kiln, &photo)?;
            let bytes = kiln.load_photo(id)?;
            std::fs::write(&path, &bytes).with_context(|| format!("writing {}", path.display()))?;
            println!("{} Wrote {} bytes to {}", "✓".green().bold(), bytes.len(), path.display());
            Ok(())
        }
        PhotoAction::Rm { photo } => {
            let id = resolve::<Media>(kiln, &photo)?;
            let report = kiln.delete_media(id)?;
            out.emit(&report, |r| print_delete("photo", r))
        }
    }
}

fn print_photo(m: &Media) {
    let stage = m.stage_at_capture.map(|s| s.to_string());
    println!(
        "    {}  {}  {:<14} {}",
        m.id.short_id().yellow(),
        m.file_name,
        or_dash(stage.as_deref()).cyan(),
        or_dash(m.caption.as_deref()).dimmed()
    );
}

// ---- glaze ----

fn cmd_glaze(kiln: &LifecycleCoordinator, out: Output, action: GlazeAction) -> anyhow::Result<()> {
    match action {
        GlazeAction::Add {
            name,
            cone,
            finish,
            notes,
        } => {
            let mut glaze = Glaze::new(name, cone, finish);
            glaze.notes = notes;
            let glaze = kiln.create_glaze(glaze)?;
            out.emit(&glaze, |g| {
                println!("{} Created glaze {} {}", "✓".green().bold(), g.name.bold(), g.id.short_id().dimmed());
            })
        }
        GlazeAction::Line {
            glaze,
            ingredient,
            percentage,
        } => {
            let id = resolve::<Glaze>(kiln, &glaze)?;
            let line = kiln.add_recipe_line(id, ingredient, percentage)?;
            let glaze = kiln.store().get::<Glaze>(id)?;
            out.emit(&line, |l| {
                println!("{} Added {} {}%", "✓".green().bold(), l.ingredient.bold(), l.percentage);
                print_recipe_total(&glaze);
            })
        }
        GlazeAction::Unline { line } => {
            let id = resolve::<RecipeLine>(kiln, &line)?;
            let owner = kiln.store().recipe_owner(id)?;
            let report = kiln.delete_recipe_line(id)?;
            out.emit(&report, |r| print_delete("recipe line", r))?;
            if let (Some(owner), OutputFormat::Text) = (owner, out.format) {
                let glaze = kiln.store().get::<Glaze>(owner)?;
                println!("{} has {} recipe lines", glaze.name, glaze.recipe.len());
            }
            Ok(())
        }
        GlazeAction::List => {
            let mut glazes = kiln.store().all::<Glaze>()?;
            glazes.sort_by(|a, b| a.name.cmp(&b.name));
            out.emit(&glazes, |glazes| {
                if glazes.is_empty() {
                    println!("No glazes.");
                }
                for g in glazes {
                    println!(
                        "{}  {:<24} cone {:<4} {:<10} {} lines",
                        g.id.short_id().yellow(),
                        g.name,
                        g.cone,
                        g.finish,
                        g.recipe.len()
                    );
                }
            })
        }
        GlazeAction::Show { glaze } => {
            let id = resolve::<Glaze>(kiln, &glaze)?;
            let glaze = kiln.store().get::<Glaze>(id)?;
            out.emit(&glaze, |g| {
                println!("{} {}", g.name.bold(), g.id.to_string().dimmed());
                println!("  Cone {}, {}", g.cone, g.finish);
                for l in &g.recipe {
                    println!("    {}  {:<20} {:>6.2}%", l.id.short_id().yellow(), l.ingredient, l.percentage);
                }
                print_recipe_total(g);
            })
        }
        GlazeAction::Rm { glaze } => {
            let id = resolve::<Glaze>(kiln, &glaze)?;
            let report = kiln.delete_glaze(id)?;
            out.emit(&report, |r| print_delete("glaze", r))
        }
    }
}

fn print_recipe_total(glaze: &Glaze) {
    let total = format!("{:.2}%", glaze.recipe_total());
    if glaze.recipe_is_balanced() {
        println!("  Total: {}", total.green());
    } else {
        println!("  Total: {}", total.yellow());
    }
}

// ---- clay ----

fn cmd_clay(kiln: &LifecycleCoordinator, out: Output, action: ClayAction) -> anyhow::Result<()> {
    match action {
        ClayAction::Add {
            name,
            cone,
            color,
            description,
        } => {
            let mut clay = ClayBody::new(name);
            clay.cone = cone;
            clay.color = color;
            clay.description = description;
            let clay = kiln.create_clay_body(clay)?;
            out.emit(&clay, |c| {
                println!("{} Added clay body {} {}", "✓".green().bold(), c.name.bold(), c.id.short_id().dimmed());
            })
        }
        ClayAction::List => {
            let mut clays = kiln.store().all::<ClayBody>()?;
            clays.sort_by(|a, b| a.name.cmp(&b.name));
            out.emit(&clays, |clays| {
                if clays.is_empty() {
                    println!("No clay bodies.");
                }
                for c in clays {
                    println!(
                        "{}  {:<24} cone {:<4} {}",
                        c.id.short_id().yellow(),
                        c.name,
                        or_dash(c.cone.as_deref()),
                        or_dash(c.color.as_deref())
                    );
                }
            })
        }
        ClayAction::Rm { clay } => {
            let id = resolve::<ClayBody>(kiln, &clay)?;
            let report = kiln.delete_clay_body(id)?;
            out.emit(&report, |r| print_delete("clay body", r))
        }
    }
}

// ---- firing ----

fn cmd_firing(kiln: &LifecycleCoordinator, out: Output, action: FiringAction) -> anyhow::Result<()> {
    match action {
        FiringAction::Add {
            kiln: kiln_name,
            firing_type,
            cone,
            atmosphere,
            notes,
        } => {
            let mut firing = Firing::new(kiln_name, firing_type, cone);
            firing.atmosphere = atmosphere;
            firing.notes = notes;
            let firing = kiln.create_firing(firing)?;
            out.emit(&firing, |f| {
                println!("{} Recorded {} firing in {} {}", "✓".green().bold(), f.firing_type, f.kiln_name.bold(), f.id.short_id().dimmed());
            })
        }
        FiringAction::AddPiece { firing, piece } => {
            let firing = resolve::<Firing>(kiln, &firing)?;
            let piece = resolve::<Piece>(kiln, &piece)?;
            let added = kiln.add_piece_to_firing(firing, piece)?;
            out.emit(&added, |added| {
                if *added {
                    println!("{} Loaded piece into firing", "✓".green().bold());
                } else {
                    println!("Piece is already in this firing.");
                }
            })
        }
        FiringAction::RemovePiece { firing, piece } => {
            let firing = resolve::<Firing>(kiln, &firing)?;
            let piece = resolve::<Piece>(kiln, &piece)?;
            let removed = kiln.remove_piece_from_firing(firing, piece)?;
            out.emit(&removed, |removed| {
                if *removed {
                    println!("{} Took piece out of firing", "✓".green().bold());
                } else {
                    println!("Piece was not in this firing.");
                }
            })
        }
        FiringAction::List => {
            let mut firings = kiln.store().all::<Firing>()?;
            firings.sort_by_key(|f| f.created_at);
            out.emit(&firings, |firings| {
                if firings.is_empty() {
                    println!("No firings.");
                }
                for f in firings {
                    println!(
                        "{}  {:<16} {:<8} cone {:<4} {} pieces",
                        f.id.short_id().yellow(),
                        f.kiln_name,
                        f.firing_type,
                        f.cone,
                        f.pieces.len()
                    );
                }
            })
        }
        FiringAction::Rm { firing } => {
            let id = resolve::<Firing>(kiln, &firing)?;
            let report = kiln.delete_firing(id)?;
            out.emit(&report, |r| print_delete("firing", r))
        }
    }
}

// ---- board and maintenance ----

fn cmd_board(kiln: &LifecycleCoordinator, out: Output, args: BoardArgs) -> anyhow::Result<()> {
    let board = kiln.board()?;
    out.emit(&board, |board| {
        for column in &board.columns {
            if args.compact && column.count() == 0 {
                continue;
            }
            println!("{} ({})", column.stage.display_name().bold(), column.count());
            for card in &column.pieces {
                println!("  {}  {}  {}", card.id.short_id().yellow(), card.name, format!("{} photos", card.photo_count).dimmed());
            }
        }
        println!("{} pieces", board.total());
    })
}

fn cmd_gc(kiln: &LifecycleCoordinator, out: Output) -> anyhow::Result<()> {
    let report = kiln.collect_garbage()?;
    out.emit(&report, |r| {
        println!("{} GC: {} orphan photos removed.", "✓".green(), r.deleted.len());
        for leak in &r.failed {
            println!("  {} {}: {}", "failed:".red(), leak.file_name, leak.reason);
        }
    })?;
    if !report.failed.is_empty() {
        bail!("{} photo files could not be removed", report.failed.len());
    }
    Ok(())
}

#[derive(Serialize)]
struct FsckView {
    records: Vec<(String, usize)>,
    orphan_blobs: Vec<String>,
    dangling_media: Vec<Media>,
}

fn cmd_fsck(kiln: &LifecycleCoordinator, out: Output) -> anyhow::Result<()> {
    kiln.store().verify().context("record graph failed verification")?;
    let pairing = kiln.verify_pairing()?;
    let view = FsckView {
        records: kiln
            .store()
            .counts()?
            .into_iter()
            .map(|(kind, n)| (kind.to_string(), n))
            .collect(),
        orphan_blobs: pairing.orphan_blobs.clone(),
        dangling_media: pairing.dangling_media.clone(),
    };
    out.emit(&view, |v| {
        for (kind, n) in &v.records {
            println!("  {:<14} {}", kind, n);
        }
        for name in &v.orphan_blobs {
            println!("  {} {} (run `kiln gc`)", "orphan photo:".yellow(), name);
        }
        for m in &v.dangling_media {
            println!("  {} {} -> {}", "missing file:".red(), m.id.short_id(), m.file_name);
        }
        if v.orphan_blobs.is_empty() && v.dangling_media.is_empty() {
            println!("{} No issues.", "✓".green().bold());
        }
    })?;
    if !pairing.is_healthy() {
        bail!(
            "{} orphan photos, {} records missing their file",
            pairing.orphan_blobs.len(),
            pairing.dangling_media.len()
        );
    }
    Ok(())
}

fn print_delete(what: &str, report: &DeleteReport) {
    if report.removed.is_empty() {
        println!("Nothing to delete.");
        return;
    }
    println!("{} Deleted {} ({} records)", "✓".green().bold(), what, report.removed.len());
    if !report.nullified.is_empty() {
        println!("  Unlinked from {} records", report.nullified.len());
    }
    if !report.deleted_blobs.is_empty() {
        println!("  Removed {} photo files", report.deleted_blobs.len());
    }
    for leak in &report.leaked_blobs {
        println!("  {} {}: {} (run `kiln gc`)", "leaked:".yellow(), leak.file_name, leak.reason);
    }
}
