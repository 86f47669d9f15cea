//! Command implementations on top of the storage engine

use anyhow::{anyhow, bail, Context, Result};
use std::future::Future;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use vault_core::{Action, OperationGuard, Record, SettingsManager, StorageEngine, VaultError};

/// Fields of a record given on the command line
pub struct NewRecord {
    pub key: String,
    pub username: String,
    pub email: String,
    pub secret: Option<String>,
    pub comment: String,
    pub copy_email: bool,
    pub attachments: Vec<PathBuf>,
}

pub struct App {
    engine: Arc<RwLock<StorageEngine>>,
    guard: OperationGuard,
    settings: SettingsManager,
    password: Option<String>,
}

impl App {
    pub async fn load(dir: Option<PathBuf>, password: Option<String>) -> Result<Self> {
        let engine = match dir {
            Some(dir) => StorageEngine::with_dir(dir).await,
            None => StorageEngine::new().await,
        }
        .context("Failed to initialize storage")?;
        let settings = SettingsManager::new(engine.storage_dir());

        Ok(Self {
            engine: Arc::new(RwLock::new(engine)),
            guard: OperationGuard::new(),
            settings,
            password,
        })
    }

    pub async fn list(&self) -> Result<()> {
        let engine = self.engine.read().await;
        if engine.databases().is_empty() {
            println!("No databases in {}", engine.storage_dir().display());
            return Ok(());
        }

        let last_opened = self.settings.last_opened();
        for db in engine.databases() {
            let marker = if Some(db.name.as_str()) == last_opened { "*" } else { " " };
            println!("{} {}", marker, db.name);
        }
        Ok(())
    }

    pub async fn create(&mut self, name: String) -> Result<()> {
        let password = self.new_password(&name)?;
        let engine = Arc::clone(&self.engine);

        let created = self
            .guarded(Action::Create, async move {
                let mut engine = engine.write().await;
                let created = engine.create(&name, &password).await?.name.clone();
                Ok::<_, VaultError>(created)
            })
            .await
            .context("Could not create database")?;

        println!("Created database '{}'", created);
        self.settings.set_last_opened(Some(created)).await?;
        self.finish().await
    }

    pub async fn show(&mut self, name: Option<String>, reveal: bool) -> Result<()> {
        let name = match name.or_else(|| self.settings.last_opened().map(str::to_string)) {
            Some(name) => name,
            None => bail!("No database given and none opened before"),
        };
        self.unlock(&name).await?;

        {
            let engine = self.engine.read().await;
            let records = engine
                .database(&name)
                .and_then(|db| db.records())
                .ok_or_else(|| anyhow!("Database '{}' is not open", name))?;

            if records.is_empty() {
                println!("'{}' has no records", name);
            }
            for (key, record) in records {
                println!("{}", key);
                println!("  login:    {}", record.login());
                if reveal {
                    println!("  password: {}", record.password);
                }
                if !record.date.is_empty() {
                    println!("  date:     {}", record.date);
                }
                if !record.comment.is_empty() {
                    println!("  comment:  {}", record.comment);
                }
                for filename in record.attachments.keys() {
                    println!("  file:     {}", filename);
                }
            }
        }

        self.finish().await
    }

    pub async fn put(&mut self, name: String, entry: NewRecord) -> Result<()> {
        self.unlock(&name).await?;

        let secret = match entry.secret {
            Some(secret) => secret,
            None => rpassword::prompt_password(format!("Password for record '{}': ", entry.key))?,
        };
        let mut record = Record::new(entry.key.clone());
        record.username = entry.username;
        record.email = entry.email;
        record.password = secret;
        record.comment = entry.comment;
        record.copy_email = entry.copy_email;
        record.date = chrono::Local::now().format("%Y-%m-%d").to_string();

        for path in &entry.attachments {
            let filename = path
                .file_name()
                .and_then(|n| n.to_str())
                .ok_or_else(|| anyhow!("Invalid attachment path: {}", path.display()))?;
            let content = tokio::fs::read(path)
                .await
                .with_context(|| format!("Could not read {}", path.display()))?;
            record.add_attachment(filename, &content);
        }

        let replaced = {
            let mut engine = self.engine.write().await;
            engine
                .database_mut(&name)
                .ok_or_else(|| anyhow!("Database '{}' not found", name))?
                .insert_record(record)?
                .is_some()
        };

        self.save(&name).await?;
        let verb = if replaced { "Updated" } else { "Added" };
        println!("{} record '{}' in '{}'", verb, entry.key, name);
        self.finish().await
    }

    pub async fn remove(&mut self, name: String, key: String) -> Result<()> {
        self.unlock(&name).await?;

        let removed = {
            let mut engine = self.engine.write().await;
            engine
                .database_mut(&name)
                .ok_or_else(|| anyhow!("Database '{}' not found", name))?
                .remove_record(&key)?
        };
        if removed.is_none() {
            bail!("No record '{}' in '{}'", key, name);
        }

        self.save(&name).await?;
        println!("Removed record '{}' from '{}'", key, name);
        self.finish().await
    }

    pub async fn rename(&mut self, name: String, new_name: String) -> Result<()> {
        self.unlock(&name).await?;
        let engine = Arc::clone(&self.engine);
        let old = name.clone();

        let renamed = self
            .guarded(Action::Rename, async move {
                let mut engine = engine.write().await;
                let renamed = engine.rename(&old, &new_name).await?.name.clone();
                Ok::<_, VaultError>(renamed)
            })
            .await
            .context("Could not rename database")?;

        println!("Renamed '{}' to '{}'", name, renamed);
        self.settings.set_last_opened(Some(renamed)).await?;
        self.finish().await
    }

    pub async fn passwd(&mut self, name: String) -> Result<()> {
        self.unlock(&name).await?;
        let new_password = prompt_new_password(&name)?;
        let engine = Arc::clone(&self.engine);
        let db = name.clone();

        self.guarded(Action::Save, async move {
            let mut engine = engine.write().await;
            engine.change_password(&db, &new_password).await?;
            Ok::<_, VaultError>(())
        })
        .await
        .context("Could not change password")?;

        println!("Changed password of '{}'", name);
        self.finish().await
    }

    pub async fn delete(&mut self, name: String, yes: bool) -> Result<()> {
        if !yes && !confirm(&format!("Delete database '{}'? This cannot be undone.", name))? {
            println!("Aborted");
            return Ok(());
        }

        let engine = Arc::clone(&self.engine);
        let db = name.clone();
        self.guarded(Action::Delete, async move {
            let mut engine = engine.write().await;
            engine.delete(&db).await
        })
        .await
        .context("Could not delete database")?;

        if self.settings.last_opened() == Some(name.as_str()) {
            self.settings.set_last_opened(None).await?;
        }
        println!("Deleted database '{}'", name);
        Ok(())
    }

    pub async fn export(&mut self, name: String, destination: Option<PathBuf>) -> Result<()> {
        let destination = match destination.or_else(|| self.settings.export_dir().map(PathBuf::from)) {
            Some(destination) => destination,
            None => std::env::current_dir()?,
        };
        let engine = Arc::clone(&self.engine);

        let written = self
            .guarded(Action::Export, async move {
                let engine = engine.read().await;
                engine.export(&name, &destination).await
            })
            .await
            .context("Could not export database")?;

        println!("Exported to {}", written.display());
        Ok(())
    }

    pub async fn import(&mut self, file: PathBuf) -> Result<()> {
        let engine = Arc::clone(&self.engine);

        let imported = self
            .guarded(Action::Import, async move {
                let mut engine = engine.write().await;
                let imported = engine.import(&file).await?.name.clone();
                Ok::<_, VaultError>(imported)
            })
            .await
            .context("Could not import database")?;

        println!("Imported database '{}'", imported);
        Ok(())
    }

    pub async fn import_legacy(&mut self, archive: PathBuf) -> Result<()> {
        let engine = Arc::clone(&self.engine);

        let imported = self
            .guarded(Action::Import, async move {
                let mut engine = engine.write().await;
                let imported = engine.import_legacy(&archive).await?.name.clone();
                Ok::<_, VaultError>(imported)
            })
            .await
            .context("Could not import legacy archive")?;

        println!("Imported legacy database '{}'", imported);
        Ok(())
    }

    pub async fn config(&mut self, export_dir: Option<PathBuf>, clear_export_dir: bool) -> Result<()> {
        if let Some(dir) = export_dir {
            self.settings.set_export_dir(Some(dir)).await?;
        } else if clear_export_dir {
            self.settings.set_export_dir(None).await?;
        }

        let engine = self.engine.read().await;
        println!("storage directory: {}", engine.storage_dir().display());
        match self.settings.export_dir() {
            Some(dir) => println!("export directory:  {}", dir.display()),
            None => println!("export directory:  (current directory)"),
        }
        println!("last opened:       {}", self.settings.last_opened().unwrap_or("-"));
        Ok(())
    }

    /// Open `name` in the background, prompting for its password if needed
    async fn unlock(&mut self, name: &str) -> Result<()> {
        let password = match &self.password {
            Some(password) => password.clone(),
            None => rpassword::prompt_password(format!("Password for '{}': ", name))?,
        };
        let engine = Arc::clone(&self.engine);
        let db = name.to_string();

        self.guarded(Action::Open, async move {
            let mut engine = engine.write().await;
            engine.open(&db, &password).await?;
            Ok::<_, VaultError>(())
        })
        .await
        .with_context(|| format!("Could not open database '{}'", name))?;

        self.settings.set_last_opened(Some(name.to_string())).await?;
        Ok(())
    }

    async fn save(&self, name: &str) -> Result<()> {
        let engine = Arc::clone(&self.engine);
        let db = name.to_string();

        self.guarded(Action::Save, async move {
            let mut engine = engine.write().await;
            engine.save_current(&db).await?;
            Ok::<_, VaultError>(())
        })
        .await
        .with_context(|| format!("Could not save database '{}'", name))
    }

    /// Close every open database, warning about unsaved edits
    async fn finish(&self) -> Result<()> {
        let mut engine = self.engine.write().await;
        let open: Vec<String> = engine
            .databases()
            .iter()
            .filter(|db| db.is_unlocked())
            .map(|db| db.name.clone())
            .collect();

        for name in open {
            match engine.close_checked(&name, false).await {
                Ok(()) => debug!("Closed {}", name),
                Err(VaultError::UnsavedChanges(_)) => {
                    warn!("Discarding unsaved changes in {}", name);
                    engine.close(&name).await?;
                }
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }

    /// Run `future` as `action` unless the same action is already in flight
    async fn guarded<T, F>(&self, action: Action, future: F) -> Result<T>
    where
        F: Future<Output = vault_core::Result<T>> + Send + 'static,
        T: Send + 'static,
    {
        let handle = self
            .guard
            .launch(action, future)
            .ok_or_else(|| anyhow!("{:?} is already in progress", action))?;
        let result = handle.await.context("Background operation failed")?;
        Ok(result?)
    }

    fn new_password(&self, name: &str) -> Result<String> {
        match &self.password {
            Some(password) => Ok(password.clone()),
            None => prompt_new_password(name),
        }
    }
}

fn prompt_new_password(name: &str) -> Result<String> {
    let password = rpassword::prompt_password(format!("New password for '{}': ", name))?;
    let again = rpassword::prompt_password("Repeat password: ")?;
    if password != again {
        bail!("Passwords do not match");
    }
    Ok(password)
}

fn confirm(question: &str) -> Result<bool> {
    print!("{} [y/N] ", question);
    std::io::stdout().flush()?;
    let mut answer = String::new();
    std::io::stdin().read_line(&mut answer)?;
    Ok(matches!(answer.trim(), "y" | "Y" | "yes"))
}
