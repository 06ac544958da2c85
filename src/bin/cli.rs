use std::fs;
use std::io::{self, Write};
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Local, Utc};
use clap::{Parser, Subcommand};
use prettytable::{Cell, Row, Table};

use webp2p_client::config::{Config, Overrides};
use webp2p_client::files::{format_file_size, FileLibrary, SortBy};
use webp2p_client::models::{FileRecord, FileType, RegisterRequest};
use webp2p_client::view::{Screen, ViewController};
use webp2p_client::{auth, logging, ApiClient, Error, Session, SessionStore, UploadSource};

#[derive(Parser)]
#[command(name = "webp2p")]
#[command(about = "A CLI client for the WebP2P file storage service", long_about = None)]
struct Cli {
    #[arg(long, global = true, help = "API base URL (default: http://localhost:8080/api)")]
    api_url: Option<String>,

    #[arg(long, global = true, help = "Directory holding the saved session")]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Log in to your account")]
    Login {
        #[arg(short, long, help = "Email")]
        email: String,

        #[arg(short, long, help = "Password")]
        password: String,
    },

    #[command(about = "Create a new account")]
    Register {
        #[arg(short, long, help = "Email")]
        email: String,

        #[arg(short, long, help = "Password")]
        password: String,

        #[arg(short, long, help = "Password again")]
        confirm_password: String,

        #[arg(short, long, help = "First name")]
        first_name: Option<String>,

        #[arg(short, long, help = "Last name")]
        last_name: Option<String>,
    },

    #[command(about = "Log out of your account")]
    Logout,

    #[command(about = "Show the logged in user")]
    Whoami,

    #[command(about = "Request a password reset email")]
    ForgotPassword {
        #[arg(short, long, help = "Email")]
        email: String,
    },

    #[command(about = "Set a new password with a reset token")]
    ResetPassword {
        #[arg(short, long, help = "Token from the reset email")]
        token: String,

        #[arg(short, long, help = "New password")]
        password: String,

        #[arg(short, long, help = "New password again")]
        confirm_password: String,
    },

    #[command(about = "Check whether a reset token is still usable")]
    ValidateToken {
        #[arg(short, long, help = "Token from the reset email")]
        token: String,
    },

    #[command(about = "Check that the service is reachable")]
    Health,

    #[command(flatten)]
    Files(FileCommands),
}

/// Commands that need a logged in user.
#[derive(Subcommand)]
enum FileCommands {
    #[command(about = "Upload one or more files")]
    Upload {
        #[arg(required = true, help = "Paths of the files to upload")]
        files: Vec<PathBuf>,
    },

    #[command(about = "List your files")]
    List {
        #[arg(short, long, default_value = "", help = "Only names containing this text")]
        search: String,

        #[arg(long, default_value = "date", help = "Sort by name, size or date")]
        sort: String,

        #[arg(short = 't', long = "type", help = "Only IMAGE, VIDEO or DOCUMENT files")]
        file_type: Option<String>,
    },

    #[command(about = "Show details of a file")]
    Info {
        #[arg(help = "File ID")]
        id: String,
    },

    #[command(about = "Rename a file")]
    Rename {
        #[arg(help = "File ID")]
        id: String,

        #[arg(help = "New file name")]
        name: String,
    },

    #[command(about = "Delete a file")]
    Delete {
        #[arg(help = "File ID")]
        id: String,

        #[arg(short, long, help = "Do not ask for confirmation")]
        yes: bool,
    },

    #[command(about = "Print the download (or preview) link of a file")]
    Url {
        #[arg(help = "File ID")]
        id: String,

        #[arg(long, help = "Link for inline preview instead of download")]
        preview: bool,
    },

    #[command(about = "Download a file")]
    Download {
        #[arg(help = "File ID")]
        id: String,

        #[arg(short, long, help = "Where to save it (default: the file's name)")]
        output: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        eprintln!("❌ Error: {}", e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = Config::load(Overrides {
        api_base_url: cli.api_url,
        data_dir: cli.data_dir,
    })?;
    logging::init(&config.log_filter);

    let store = SessionStore::new(&config.data_dir);
    let mut controller = ViewController::new(store.clone());
    match controller.start() {
        Ok(_) => {}
        Err(e) if e.is_session_problem() => println!("⌛ {}", e),
        Err(e) => return Err(e.into()),
    }

    let mut api = ApiClient::new(config.api_base_url.clone());
    if let Some(session) = controller.session() {
        api.set_token(session.token.clone());
    }

    match cli.command {
        Commands::Login { email, password } => {
            let session = auth::login(&mut api, &store, &email, &password).await?;
            println!("✅ Login successful!");
            println!("👤 Welcome back, {}!", session.display_name());
            println!("⏰ Session valid until: {}", local_time(session.expires_at));
            controller.on_login(session);
        }
        Commands::Register {
            email,
            password,
            confirm_password,
            first_name,
            last_name,
        } => {
            let profile = RegisterRequest {
                email: email.clone(),
                password,
                confirm_password,
                first_name,
                last_name,
            };
            let message = auth::register(&api, &profile).await?;
            println!("✅ {}", non_empty(&message, "Account created successfully!"));
            println!("\n💡 You can now log in using: webp2p login -e {} -p <password>", email);
        }
        Commands::Logout => {
            auth::logout(&mut api, &mut controller)?;
            println!("✅ Logged out successfully!");
        }
        Commands::Whoami => whoami(controller.session()),
        Commands::ForgotPassword { email } => {
            let message = auth::forgot_password(&api, &email).await?;
            println!("📧 {}", non_empty(&message, "Password reset email sent"));
        }
        Commands::ResetPassword {
            token,
            password,
            confirm_password,
        } => {
            let message = auth::reset_password(&api, &token, &password, &confirm_password).await?;
            println!("✅ {}", non_empty(&message, "Password has been reset"));
            println!("💡 Log in with your new password: webp2p login -e <email> -p <password>");
        }
        Commands::ValidateToken { token } => match auth::validate_reset_token(&api, &token).await? {
            Ok(message) => println!("✅ {}", non_empty(&message, "Token is valid")),
            Err(message) => bail!("{}", non_empty(&message, "Token is invalid or expired")),
        },
        Commands::Health => {
            let response = api.health_check().await?;
            let message = response.message.clone();
            response.into_result()?;
            println!("💚 {}", non_empty(&message, "Service is running"));
        }
        Commands::Files(command) => {
            require_login(&controller)?;
            run_file_command(api, command).await?;
        }
    }

    Ok(())
}

fn require_login(controller: &ViewController) -> Result<()> {
    match controller.current_screen(Screen::Home) {
        Screen::Home => Ok(()),
        _ => Err(Error::NotAuthenticated.into()),
    }
}

async fn run_file_command(api: ApiClient, command: FileCommands) -> Result<()> {
    match command {
        FileCommands::Upload { files } => {
            let sources = files
                .iter()
                .map(UploadSource::from_path)
                .collect::<Result<Vec<_>, _>>()?;

            let mut library = FileLibrary::new(api);
            library.refresh().await?;

            for source in &sources {
                let file = library.upload(source).await?;
                println!("✅ Uploaded {} ({})", file.name, format_file_size(file.size));
                println!("   🆔 ID: {}", file.id);
            }

            println!(
                "\n📚 {} file(s) in your library, {}",
                library.len(),
                format_file_size(library.total_size())
            );
            println!("💡 Use 'webp2p list' to see all your files");
        }
        FileCommands::List {
            search,
            sort,
            file_type,
        } => {
            let sort_by: SortBy = sort.parse().unwrap_or(SortBy::Unsorted);
            let library = match file_type {
                Some(ty) => {
                    let ty: FileType = ty.parse()?;
                    FileLibrary::with_files(api.clone(), api.list_my_files_by_type(ty).await?)
                }
                None => {
                    let mut library = FileLibrary::new(api);
                    library.refresh().await?;
                    library
                }
            };
            print_library(&library, &search, sort_by);
        }
        FileCommands::Info { id } => {
            let file = api.get_file_info(&id).await?;
            print_file(&file);
            if let Ok(url) = api.preview_url(&file.id) {
                println!("   👁️  Preview: {}", url);
            }
        }
        FileCommands::Rename { id, name } => {
            let mut library = FileLibrary::new(api);
            library.refresh().await?;
            let old_name = library.get(&id).map(|f| f.name.clone());
            let file = library.rename(&id, &name).await?;
            match old_name {
                Some(old) => println!("✅ Renamed '{}' to '{}'", old, file.name),
                None => println!("✅ Renamed file to '{}'", file.name),
            }
        }
        FileCommands::Delete { id, yes } => {
            let mut library = FileLibrary::new(api);
            library.refresh().await?;
            let name = library
                .get(&id)
                .map(|f| f.name.clone())
                .with_context(|| format!("File not found with ID: {}", id))?;

            if !yes && !confirm(&format!("❓ Delete '{}'? (yes/no): ", name))? {
                println!("❌ Delete cancelled");
                return Ok(());
            }

            library.delete(&id).await?;
            println!("🗑️  Deleted '{}'", name);
            println!("📊 {} file(s) left, {}", library.len(), format_file_size(library.total_size()));
        }
        FileCommands::Url { id, preview } => {
            let url = if preview {
                api.preview_url(&id)?
            } else {
                api.download_url(&id)?
            };
            println!("{}", url);
        }
        FileCommands::Download { id, output } => {
            let file = api.get_file_info(&id).await?;
            let target = output.unwrap_or_else(|| file.local_file_name());
            if target.exists() && !confirm(&format!("❓ Overwrite {}? (yes/no): ", target.display()))? {
                println!("❌ Download cancelled");
                return Ok(());
            }

            let bytes = api.download(&id).await?;
            fs::write(&target, &bytes)
                .with_context(|| format!("Failed to write {}", target.display()))?;
            println!("✅ Saved {} ({})", target.display(), format_file_size(bytes.len() as u64));
        }
    }

    Ok(())
}

fn whoami(session: Option<&Session>) {
    match session {
        Some(session) => {
            println!("👤 Logged in as: {}", session.email);
            if let Some(first) = &session.first_name {
                println!("   First name: {}", first);
            }
            if let Some(last) = &session.last_name {
                println!("   Last name: {}", last);
            }
            println!("⏰ Token expires: {}", local_time(session.expires_at));
        }
        None => {
            println!("❌ Not logged in");
            println!("💡 Use 'webp2p login -e <email> -p <password>' to log in");
        }
    }
}

fn print_library(library: &FileLibrary<ApiClient>, search: &str, sort_by: SortBy) {
    let files = library.view(search, sort_by);

    if files.is_empty() {
        if library.is_empty() {
            println!("📭 No files uploaded yet.");
            println!("💡 Use 'webp2p upload <file>' to upload a file");
        } else {
            println!("📭 No files match '{}'", search);
        }
        return;
    }

    println!(
        "\n📚 Your files ({} total, {})\n",
        library.len(),
        format_file_size(library.total_size())
    );

    let mut table = Table::new();
    table.add_row(Row::new(vec![
        Cell::new("ID"),
        Cell::new("Name"),
        Cell::new("Type"),
        Cell::new("Size"),
        Cell::new("Uploaded"),
    ]));

    for file in files {
        table.add_row(Row::new(vec![
            Cell::new(&file.id),
            Cell::new(&file.name),
            Cell::new(file.file_type.as_str()),
            Cell::new(&format_file_size(file.size)),
            Cell::new(&local_time(file.uploaded_at)),
        ]));
    }

    table.printstd();
    println!();
}

fn print_file(file: &FileRecord) {
    println!("📄 {}", file.name);
    println!("   🆔 ID: {}", file.id);
    println!("   🗂️  Type: {} ({})", file.file_type, file.content_type);
    println!("   📊 Size: {}", format_file_size(file.size));
    println!("   ⏰ Uploaded: {}", local_time(file.uploaded_at));
    println!("   ⬇️  Download: {}", file.download_url);
}

fn local_time(time: DateTime<Utc>) -> String {
    time.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S").to_string()
}

fn non_empty<'a>(message: &'a str, fallback: &'a str) -> &'a str {
    if message.trim().is_empty() {
        fallback
    } else {
        message
    }
}

fn confirm(prompt: &str) -> Result<bool> {
    print!("{}", prompt);
    io::stdout().flush()?;

    let mut input = String::new();
    io::stdin().read_line(&mut input)?;

    let answer = input.trim().to_lowercase();
    Ok(answer == "yes" || answer == "y")
}
