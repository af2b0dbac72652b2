//! Command handlers

use crate::cli::{Cli, Command, InstanceArgs, ScenarioArgs, TransferArgs};
use crate::editor::{edit_json, Edited};
use crate::prompt::InquirePrompter;
use crate::table::Table;
use anyhow::{anyhow, bail, Context, Result};
use colored::Colorize;
use rose_folder::{normalize_path, Binding, FolderIndex, IndexEntry};
use rose_http::{HttpTransport, OAuthClient, Session, TokenStore};
use rose_record::{field, looks_like_uuid, Query, Record, ScenarioRecord};
use rose_remote::{Entity, ScenarioApi};
use rose_sync::{
    DownloadOptions, DownloadOutcome, DownloadReport, InstanceOptions, NonInteractive, ProvisionReport,
    Prompter, Provisioner, ScenarioOptions, Settings, SyncEngine, UpdateReport, UploadOptions, UploadOutcome,
    UploadReport,
};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

const DEFAULT_COLUMNS: [&str; 3] = [field::NAME, field::UUID, field::MODIFIED_TIMESTAMP];
const CLASS_MARK: &str = " ┌── ";
const INSTANCE_MARK: &str = " └── ";

/// Everything a handler needs besides its arguments
struct App {
    settings: Settings,
    root: PathBuf,
    yes: bool,
}

impl App {
    fn api(&self) -> Result<ScenarioApi> {
        let store = TokenStore::for_current_shell();
        let tokens = store.load()?;
        let session = Session::new(&self.settings.server.api_url, &self.settings.server.api_path, tokens);
        let auth = &self.settings.auth;
        let oauth = OAuthClient::new(&auth.client_id, &auth.client_secret, &auth.token_endpoint);
        let transport = HttpTransport::new(session, oauth)?.with_token_store(store);
        Ok(ScenarioApi::new(Arc::new(transport)).with_system_fields(self.settings.system_fields.clone()))
    }

    fn prompter(&self) -> Arc<dyn Prompter> {
        if self.yes {
            Arc::new(NonInteractive::new(true))
        } else {
            Arc::new(InquirePrompter)
        }
    }

    fn engine(&self) -> Result<SyncEngine> {
        Ok(SyncEngine::new(self.api()?, self.settings.clone(), self.prompter()).with_root(&self.root))
    }

    /// Path relative to the working directory, for display
    fn show(&self, path: &Path) -> String {
        match path.strip_prefix(&self.root) {
            Ok(rel) if rel.as_os_str().is_empty() => ".".to_string(),
            Ok(rel) => rel.display().to_string(),
            Err(_) => path.display().to_string(),
        }
    }

    fn download_options(&self, transfer: TransferArgs, class_update: bool, keep_files: bool) -> DownloadOptions {
        DownloadOptions {
            class_update,
            wipe: !keep_files,
            skip_confirmation: self.yes,
            check: transfer.check,
            dry_run: transfer.dry_run,
            force_upload: false,
        }
    }
}

/// Run one parsed command line
pub(crate) async fn run(cli: Cli) -> Result<()> {
    let settings = Settings::load(cli.config.as_deref())?;
    let root = normalize_path(&std::env::current_dir().context("could not determine the working directory")?);
    let app = App {
        settings,
        root,
        yes: cli.yes,
    };
    debug!(command = ?cli.command, root = %app.root.display(), "running command");

    match cli.command {
        Command::Login { tokens, force } => login(&tokens, force),
        Command::Logout => logout(),
        Command::User { json } => user(&app, json).await,
        Command::Server => {
            println!("{}", app.settings.server.api_url);
            Ok(())
        }
        Command::Ls {
            entity,
            pattern,
            json,
            uuid,
            fields,
        } => ls(&app, &entity, pattern.as_deref(), json, uuid, fields).await,
        Command::Info { folder, link } => info(&app, folder.as_deref(), link),
        Command::InitScenario {
            folder,
            create,
            scenario,
        } => init_scenario(&app, folder, create, scenario).await,
        Command::CreateScenario { folder, scenario } => init_scenario(&app, folder, true, scenario).await,
        Command::InitInstance {
            class_folder,
            create,
            instance,
        } => init_instance(&app, &class_folder, create, instance).await,
        Command::CreateInstance { class_folder, instance } => init_instance(&app, &class_folder, true, instance).await,
        Command::UpdateScenario {
            folder,
            full,
            cascade,
            instances_only,
            transfer,
        } => {
            let options = UploadOptions {
                force: full,
                instances_only,
                cascade,
                check: transfer.check,
                dry_run: transfer.dry_run,
                download: app.download_options(transfer, false, false),
            };
            let engine = app.engine()?;
            let report = engine.upload(&folder, &options).await?;
            print_upload(&app, &report);
            engine.wait_for_hooks().await;
            Ok(())
        }
        Command::UpdateInstance {
            folder,
            no_class_update,
            keep_files,
            transfer,
        } => {
            let options = app.download_options(transfer, !no_class_update, keep_files);
            let engine = app.engine()?;
            let report = engine.download(&folder, &options).await?;
            print_download(&app, &report);
            engine.wait_for_hooks().await;
            Ok(())
        }
        Command::Update {
            folder,
            no_class_update,
            full,
            keep_files,
            transfer,
        } => {
            let options = UploadOptions {
                force: full,
                check: transfer.check,
                dry_run: transfer.dry_run,
                download: app.download_options(transfer, !no_class_update, keep_files),
                ..UploadOptions::default()
            };
            let engine = app.engine()?;
            match engine.update(&folder, &options).await? {
                UpdateReport::Class(report) => print_upload(&app, &report),
                UpdateReport::Instance(report) => print_download(&app, &report),
            }
            engine.wait_for_hooks().await;
            Ok(())
        }
        Command::Cleanup => cleanup(&app).await,
        Command::ShowConfig { target } => {
            let engine = app.engine()?;
            let (scenario, _) = resolve_scenario(&engine, &target).await?;
            let config = engine.api().config_json(scenario.uuid()).await?;
            println!("{}", serde_json::to_string_pretty(&config)?);
            Ok(())
        }
        Command::EditConfig { target, no_update } => edit_config(&app, &target, no_update).await,
        Command::Instantiate {
            target,
            placeholder,
            with,
        } => instantiate(&app, &target, placeholder.as_deref(), with.as_deref()).await,
        Command::Version => {
            println!("rose {}", env!("CARGO_PKG_VERSION"));
            println!("  rose-sync   {}", rose_sync::VERSION);
            println!("  rose-remote {}", rose_remote::VERSION);
            println!("  rose-http   {}", rose_http::VERSION);
            Ok(())
        }
    }
}

// ----------------------------------------------------------------------
// Login

fn login(tokens: &Path, force: bool) -> Result<()> {
    let store = TokenStore::for_current_shell();
    if store.install(tokens, force)? {
        println!("{} logged in", "✓".green());
    } else {
        println!("already logged in; use --force to replace the tokens");
    }
    Ok(())
}

fn logout() -> Result<()> {
    if TokenStore::for_current_shell().remove()? {
        println!("logged out");
    } else {
        println!("not logged in");
    }
    Ok(())
}

async fn user(app: &App, json: bool) -> Result<()> {
    let user = app.api()?.user().await?;
    if json {
        println!("{}", serde_json::to_string_pretty(&user)?);
        return Ok(());
    }
    let text = |key: &str| user.get(key).and_then(Value::as_str).unwrap_or_default().to_string();
    match (text("name"), text("email")) {
        (name, email) if !email.is_empty() => println!("{name} <{email}>"),
        (name, _) if !name.is_empty() => println!("{name}"),
        _ => println!("{user}"),
    }
    Ok(())
}

// ----------------------------------------------------------------------
// Listing

fn cell(record: &Record, key: &str) -> String {
    match record.get(key) {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

async fn ls(
    app: &App,
    entity_name: &str,
    pattern: Option<&str>,
    json: bool,
    uuid_only: bool,
    fields: Option<Vec<String>>,
) -> Result<()> {
    let entity: Entity = entity_name.parse()?;
    let api = app.api()?;
    let instances = entity_name.eq_ignore_ascii_case("instances");

    let mut records: Vec<Record> = if instances {
        let Some(class) = pattern else {
            bail!("listing instances needs the name or uuid of a scenario class");
        };
        let class = one_class(&api, class).await?;
        api.instances_of(class.uuid())
            .await?
            .into_iter()
            .map(ScenarioRecord::into_record)
            .collect()
    } else {
        match pattern {
            Some(id) if looks_like_uuid(id) => vec![api.get(entity, id).await?],
            Some(glob) if entity == Entity::Connections => class_records(&api, Query::new().name_glob(glob)).await?,
            Some(glob) => api.find(entity, &Query::new().name_glob(glob)).await?,
            None if entity == Entity::Connections => class_records(&api, Query::new()).await?,
            None => api.list(entity).await?,
        }
    };
    records.sort_by(|a, b| cell(a, field::NAME).cmp(&cell(b, field::NAME)));

    if json {
        println!("{}", serde_json::to_string_pretty(&records)?);
    } else if uuid_only {
        let ids: Vec<String> = records.iter().map(|r| cell(r, field::UUID)).collect();
        println!("{}", ids.join(","));
    } else {
        let columns: Vec<String> =
            fields.unwrap_or_else(|| DEFAULT_COLUMNS.iter().map(|c| (*c).to_string()).collect());
        let mut table = Table::new(columns.iter().cloned());
        for record in &records {
            table.push(columns.iter().map(|c| cell(record, c)));
        }
        print!("{}", table.render());
    }
    Ok(())
}

async fn class_records(api: &ScenarioApi, query: Query) -> Result<Vec<Record>> {
    Ok(api
        .find_classes(query)
        .await?
        .into_iter()
        .map(ScenarioRecord::into_record)
        .collect())
}

async fn one_class(api: &ScenarioApi, name_or_uuid: &str) -> Result<ScenarioRecord> {
    if looks_like_uuid(name_or_uuid) {
        let uuid: Uuid = name_or_uuid.parse()?;
        let scenario = api.scenario(uuid).await?;
        if !scenario.is_class() {
            bail!("\"{}\" is a scenario instance, not a scenario class", scenario.name());
        }
        return Ok(scenario);
    }
    Ok(api.find_one_class(Query::new().name_glob(name_or_uuid)).await?)
}

fn kind_label(binding: &Binding) -> String {
    let kind = if binding.is_class { "class" } else { "instance" };
    if binding.is_local() {
        format!("{kind} (local)")
    } else {
        kind.to_string()
    }
}

fn info(app: &App, folder: Option<&Path>, link: bool) -> Result<()> {
    let index = FolderIndex::scan(&app.root, &app.settings.marker_store())?;
    let base_url = if link { Some(app.api()?) } else { None };

    let mut head = vec!["", "FOLDER", "KIND", "NAME", "UUID"];
    if link {
        head.push("LINK");
    }
    let mut table = Table::new(head);
    let mut row = |mark: &str, entry: IndexEntry<'_>| {
        let mut cells = vec![
            mark.to_string(),
            app.show(entry.path),
            kind_label(entry.binding),
            entry.binding.name().to_string(),
            entry.binding.uuid().to_string(),
        ];
        if let Some(api) = &base_url {
            cells.push(api.entity_page_url(Entity::Connections, &entry.binding.uuid().to_string()));
        }
        table.push(cells);
    };

    if let Some(folder) = folder {
        let related = index.related(&normalize_path(folder))?;
        match related.as_slice() {
            [class, instances @ ..] if class.binding.is_class => {
                row(CLASS_MARK, *class);
                for instance in instances {
                    row(INSTANCE_MARK, *instance);
                }
            }
            [instance, class] => {
                row(CLASS_MARK, *class);
                row(INSTANCE_MARK, *instance);
            }
            entries => entries.iter().for_each(|e| row("", *e)),
        }
        print!("{}", table.render());
        return Ok(());
    }

    let listing = index.listing();
    for group in &listing.groups {
        row(CLASS_MARK, group.class);
        for instance in &group.instances {
            row(INSTANCE_MARK, *instance);
        }
    }
    for orphan in &listing.orphans {
        row("", *orphan);
    }
    for broken in listing.malformed {
        table.push([String::new(), app.show(&broken.path), "malformed".to_string(), broken.reason.clone()]);
    }

    if table.is_empty() {
        println!("no connected folders below {}", app.root.display());
    } else {
        print!("{}", table.render());
    }
    Ok(())
}

// ----------------------------------------------------------------------
// Provisioning

async fn init_scenario(app: &App, folder: Option<PathBuf>, create: bool, args: ScenarioArgs) -> Result<()> {
    let engine = app.engine()?;
    let folder = folder.unwrap_or_else(|| app.root.clone());
    let options = ScenarioOptions {
        create,
        is_local: args.is_local(),
        existing: args.existing,
        name: args.name,
        initial_sync: args.sync,
        skip_initial_upload: args.no_upload,
    };
    let report = Provisioner::new(&engine).init_scenario(&folder, options).await?;
    print_provisioned(app, &report);
    engine.wait_for_hooks().await;
    Ok(())
}

async fn init_instance(app: &App, class_folder: &Path, create: bool, args: InstanceArgs) -> Result<()> {
    let engine = app.engine()?;
    let options = InstanceOptions {
        create,
        existing: args.existing,
        name: args.name,
        folder: args.folder,
        initial_sync: args.sync,
    };
    let report = Provisioner::new(&engine).init_instance(class_folder, options).await?;
    print_provisioned(app, &report);
    engine.wait_for_hooks().await;
    Ok(())
}

fn print_provisioned(app: &App, report: &ProvisionReport) {
    let kind = if report.binding.is_class {
        "scenario class"
    } else {
        "scenario instance"
    };
    let verb = if report.created { "created" } else { "connected" };
    println!(
        "{} {verb} {kind} \"{}\" ({}) in {}",
        "✓".green(),
        report.binding.name().bold(),
        report.binding.uuid(),
        app.show(&report.folder)
    );
    if let Some(upload) = &report.initial_upload {
        print_upload(app, upload);
    }
    if let Some(download) = &report.initial_download {
        print_download(app, download);
    }
}

// ----------------------------------------------------------------------
// Transfer reports

fn print_files(label: &str, files: &[PathBuf]) {
    for file in files {
        println!("  {label} {}", file.display());
    }
}

fn print_upload(app: &App, report: &UploadReport) {
    let folder = app.show(&report.folder);
    match &report.outcome {
        UploadOutcome::Uploaded { files } => {
            println!("{} uploaded {} file(s) from {folder}", "✓".green(), files.len());
        }
        UploadOutcome::NothingToUpload => println!("nothing to upload in {folder}"),
        UploadOutcome::DryRun { files } => {
            println!("would upload {} file(s) from {folder}:", files.len());
            print_files("+", files);
        }
        UploadOutcome::Skipped => {}
    }
    for download in &report.cascade {
        print_download(app, download);
    }
}

fn print_download(app: &App, report: &DownloadReport) {
    if let Some(upload) = &report.class_upload {
        print_upload(app, upload);
    }
    let folder = app.show(&report.folder);
    match &report.outcome {
        DownloadOutcome::Extracted {
            written,
            removed,
            copied_from_class,
        } => {
            if let Some(copied) = copied_from_class {
                println!("copied {copied} file(s) from the local class folder into {folder}");
            }
            println!(
                "{} downloaded {} file(s) into {folder} ({} removed)",
                "✓".green(),
                written.len(),
                removed.len()
            );
        }
        DownloadOutcome::Declined => println!("{} left {folder} untouched", "-".yellow()),
        DownloadOutcome::DryRun { written, removed } => {
            println!(
                "would write {} and remove {} file(s) in {folder}:",
                written.len(),
                removed.len()
            );
            print_files("+", written);
            print_files("-", removed);
        }
    }
    if report.hook_started {
        println!("install hook started in {folder}");
    }
}

// ----------------------------------------------------------------------
// Cleanup

async fn cleanup(app: &App) -> Result<()> {
    let engine = app.engine()?;
    let index = engine.scan()?;
    let summary = engine.reconciler().cleanup_all(&index).await;

    for path in &summary.updated {
        println!("{} updated {}", "✓".green(), app.show(path));
    }
    for (path, name) in &summary.disconnected {
        println!(
            "{} disconnected {} (\"{name}\" no longer exists)",
            "-".yellow(),
            app.show(path)
        );
    }
    for (path, err) in &summary.failed {
        println!("{} {}: {err}", "✗".red(), app.show(path));
    }
    println!(
        "checked {} folder(s): {} unchanged, {} updated, {} disconnected, {} failed",
        summary.checked(),
        summary.unchanged.len(),
        summary.updated.len(),
        summary.disconnected.len(),
        summary.failed.len()
    );
    if !summary.failed.is_empty() {
        bail!("{} folder(s) could not be checked", summary.failed.len());
    }
    Ok(())
}

// ----------------------------------------------------------------------
// Config and placeholders

/// A bound folder, a uuid, or a name pattern matching exactly one scenario
///
/// Returns the scenario and, for a bound folder, the folder.
async fn resolve_scenario(engine: &SyncEngine, target: &str) -> Result<(ScenarioRecord, Option<PathBuf>)> {
    let path = Path::new(target);
    if path.is_dir() && engine.store().has_marker(path) {
        let folder = normalize_path(path);
        let mut binding = engine.store().load(&folder)?;
        engine.reconciler().ensure_current(&folder, &mut binding).await?;
        return Ok((binding.object, Some(folder)));
    }
    if looks_like_uuid(target) {
        let uuid: Uuid = target.parse()?;
        return Ok((engine.api().scenario(uuid).await?, None));
    }
    let mut found = engine.api().find_scenarios(&Query::new().name_glob(target)).await?;
    match found.len() {
        0 => Err(anyhow!("no connected folder or scenario named \"{target}\"")),
        1 => Ok((found.remove(0), None)),
        n => Err(anyhow!(
            "\"{target}\" matches {n} scenarios ({}); use a uuid",
            found.iter().map(ScenarioRecord::name).collect::<Vec<_>>().join(", ")
        )),
    }
}

async fn edit_config(app: &App, target: &str, no_update: bool) -> Result<()> {
    let engine = app.engine()?;
    let (scenario, folder) = resolve_scenario(&engine, target).await?;
    let config = engine.api().config_json(scenario.uuid()).await?;

    let Edited::Changed(config) = edit_json(&config, engine.prompter())? else {
        println!("config of \"{}\" unchanged", scenario.name());
        return Ok(());
    };
    engine.api().update_config_json(scenario.uuid(), config).await?;
    println!("{} saved config of \"{}\"", "✓".green(), scenario.name().bold());

    if let Some(folder) = folder.filter(|_| scenario.is_instance() && !no_update) {
        let options = app.download_options(TransferArgs::default(), false, false);
        let report = engine.download(&folder, &options).await?;
        print_download(app, &report);
        engine.wait_for_hooks().await;
    }
    Ok(())
}

async fn instantiate(app: &App, target: &str, placeholder: Option<&str>, with: Option<&str>) -> Result<()> {
    let engine = app.engine()?;
    let (scenario, _) = resolve_scenario(&engine, target).await?;
    let Some(placeholder) = placeholder else {
        let placeholders = engine.api().placeholders(scenario.uuid()).await?;
        if placeholders.is_empty() {
            println!("\"{}\" has no placeholders", scenario.name());
            return Ok(());
        }
        let mut table = Table::new(["PLACEHOLDER", "INSTANTIATED WITH"]);
        for (id, p) in &placeholders {
            table.push([id.clone(), p.instantiated_with.clone().unwrap_or_default()]);
        }
        print!("{}", table.render());
        return Ok(());
    };

    let result = engine
        .api()
        .instantiate_placeholder(scenario.uuid(), placeholder, with)
        .await?;
    debug!(placeholder, result = %result, "placeholder instantiated");
    println!(
        "{} instantiated placeholder \"{placeholder}\" of \"{}\"",
        "✓".green(),
        scenario.name().bold()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn app(root: &str) -> App {
        App {
            settings: Settings::default(),
            root: PathBuf::from(root),
            yes: false,
        }
    }

    #[test]
    fn cells_render_scalars_plainly() {
        let record = json!({ "NAME": "Fetch", "ID": 7, "GONE": null })
            .as_object()
            .cloned()
            .unwrap();
        assert_eq!(cell(&record, "NAME"), "Fetch");
        assert_eq!(cell(&record, "ID"), "7");
        assert_eq!(cell(&record, "GONE"), "");
        assert_eq!(cell(&record, "MISSING"), "");
    }

    #[test]
    fn paths_are_shown_relative_to_the_root() {
        let app = app("/work");
        assert_eq!(app.show(Path::new("/work")), ".");
        assert_eq!(app.show(Path::new("/work/fetch/robot")), "fetch/robot");
        assert_eq!(app.show(Path::new("/elsewhere")), "/elsewhere");
    }

    #[test]
    fn download_options_follow_flags() {
        let mut app = app("/work");
        app.yes = true;
        let transfer = TransferArgs {
            check: true,
            dry_run: false,
        };
        let options = app.download_options(transfer, false, true);
        assert!(!options.class_update);
        assert!(!options.wipe);
        assert!(options.skip_confirmation);
        assert!(options.check);
    }
}
