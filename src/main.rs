use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::EnvFilter;

mod cli;

use cli::{
    Cli, CollectionAction, Command, ContextAction, EmbedArgs, QueryArgs,
    StatusArgs, VsearchArgs,
};
use docfuse::{
    DataDir, EmbeddingDb, Engine, Error, JobStatus, Result, Store,
    runtime::HashEmbedder,
};

fn init_tracing(verbose: u8, quiet: bool) {
    let filter = if let Ok(env) = std::env::var("DOCFUSE_LOG") {
        EnvFilter::new(env)
    } else if quiet {
        EnvFilter::new("warn")
    } else {
        match verbose {
            0 => EnvFilter::new("info"),
            1 => EnvFilter::new("debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .without_time()
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.quiet);

    if let Command::Completions(args) = &cli.command {
        args.generate();
        return Ok(());
    }

    let data_dir = DataDir::resolve(cli.data_dir.as_deref())?;
    let store = Arc::new(Store::open(&data_dir.store_db())?);
    let embeddings = Arc::new(EmbeddingDb::open(&data_dir.embeddings_db())?);
    let engine =
        Engine::new(store, embeddings, Arc::new(HashEmbedder::default()));

    match cli.command {
        Command::Collection { action } => match action {
            CollectionAction::Add { path, name, glob } => {
                collection_add(&engine, &path, &name, glob.as_deref())?;
            }
            CollectionAction::Remove { name } => {
                collection_remove(&engine, &name)?;
            }
            CollectionAction::List { json } => {
                collection_list(&engine, json)?;
            }
        },
        Command::Context { action } => match action {
            ContextAction::Add {
                collection,
                prefix,
                description,
            } => {
                engine.store().set_path_context(
                    &collection,
                    &prefix,
                    &description,
                )?;
                println!("Added context for '{collection}:{prefix}'");
            }
            ContextAction::Remove { collection, prefix } => {
                if !engine.store().remove_path_context(&collection, &prefix)?
                {
                    return Err(Error::NotFound {
                        kind: "context",
                        name: format!("{collection}:{prefix}"),
                    });
                }
                println!("Removed context for '{collection}:{prefix}'");
            }
            ContextAction::List { collection, json } => {
                context_list(&engine, collection.as_deref(), json)?;
            }
        },
        Command::Index(args) => {
            cmd_index(&engine, args.collection.as_deref())?;
        }
        Command::Query(args) => cmd_query(&engine, &args)?,
        Command::Vsearch(args) => cmd_vsearch(&engine, &args)?,
        Command::Embed(args) => cmd_embed(&engine, &args)?,
        Command::Status(args) => cmd_status(&engine, &args)?,
        Command::Completions(_) => unreachable!(),
    }

    Ok(())
}

fn collection_add(
    engine: &Engine,
    path: &std::path::Path,
    name: &str,
    glob: Option<&str>,
) -> Result<()> {
    if !path.exists() {
        return Err(Error::Config(format!(
            "directory does not exist: {}",
            path.display()
        )));
    }
    if !path.is_dir() {
        return Err(Error::Config(format!(
            "path is not a directory: {}",
            path.display()
        )));
    }

    let abs_path = path.canonicalize().map_err(|e| {
        Error::Config(format!("cannot resolve path {}: {e}", path.display()))
    })?;

    if engine.store().get_collection(name)?.is_some() {
        return Err(Error::Config(format!(
            "collection '{name}' already exists"
        )));
    }

    engine.store().add_collection(
        name,
        &abs_path.to_string_lossy(),
        glob,
    )?;
    let summary = engine.sync_collection(name)?;

    println!(
        "Added collection '{name}' -> {} ({} documents)",
        abs_path.display(),
        summary.indexed
    );
    Ok(())
}

fn collection_remove(engine: &Engine, name: &str) -> Result<()> {
    if engine.store().get_collection(name)?.is_none() {
        return Err(Error::NotFound {
            kind: "collection",
            name: name.to_string(),
        });
    }
    engine.store().remove_collection(name)?;
    println!("Removed collection '{name}'");
    Ok(())
}

fn collection_list(engine: &Engine, json: bool) -> Result<()> {
    let collections = engine.store().list_collections()?;

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&collections)
                .unwrap_or_else(|_| "[]".to_string())
        );
    } else if collections.is_empty() {
        println!("No collections registered.");
    } else {
        for info in &collections {
            match &info.glob {
                Some(glob) => {
                    println!("{}\t{}\t{glob}", info.name, info.root_path);
                }
                None => println!("{}\t{}", info.name, info.root_path),
            }
        }
    }
    Ok(())
}

fn context_list(
    engine: &Engine,
    collection: Option<&str>,
    json: bool,
) -> Result<()> {
    let contexts = engine.store().list_path_contexts(collection)?;

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&contexts)
                .unwrap_or_else(|_| "[]".to_string())
        );
    } else if contexts.is_empty() {
        println!("No contexts defined.");
    } else {
        for ctx in &contexts {
            println!("{}:{}\t{}", ctx.collection, ctx.prefix, ctx.context);
        }
    }
    Ok(())
}

fn cmd_index(engine: &Engine, collection: Option<&str>) -> Result<()> {
    let targets: Vec<String> = match collection {
        Some(name) => vec![name.to_string()],
        None => engine
            .store()
            .list_collections()?
            .into_iter()
            .map(|info| info.name)
            .collect(),
    };

    if targets.is_empty() {
        eprintln!("No collections to index.");
        return Ok(());
    }

    for name in &targets {
        let summary = engine.sync_collection(name)?;
        println!(
            "{name}: indexed {} documents, removed {}",
            summary.indexed, summary.removed
        );
    }
    Ok(())
}

fn cmd_query(engine: &Engine, args: &QueryArgs) -> Result<()> {
    let results =
        engine.query(&args.query, args.collection.as_deref(), args.count)?;

    if args.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&results)
                .unwrap_or_else(|_| "[]".to_string())
        );
        return Ok(());
    }

    if results.is_empty() {
        println!("No results found.");
        return Ok(());
    }

    for (i, r) in results.iter().enumerate() {
        println!(
            "{:>3}. [{:.3}] {}:{}",
            i + 1,
            r.final_score,
            r.collection,
            r.path
        );
        if !r.title.is_empty() {
            println!("     {}", r.title);
        }
    }
    println!("\n{} result(s)", results.len());
    Ok(())
}

fn cmd_vsearch(engine: &Engine, args: &VsearchArgs) -> Result<()> {
    let results = engine.vsearch(
        &args.query,
        args.collection.as_deref(),
        args.count,
        args.min_score,
    )?;

    if args.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&results)
                .unwrap_or_else(|_| "[]".to_string())
        );
        return Ok(());
    }

    if results.is_empty() {
        println!("No results found.");
        return Ok(());
    }

    for (i, r) in results.iter().enumerate() {
        println!(
            "{:>3}. [{:.3}] {}:{}",
            i + 1,
            r.score,
            r.collection,
            r.path
        );
        if !r.excerpt.is_empty() {
            println!("     {}", r.excerpt);
        }
    }
    println!("\n{} result(s)", results.len());
    Ok(())
}

fn cmd_embed(engine: &Engine, args: &EmbedArgs) -> Result<()> {
    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(async {
        let mut rx = engine.embed_index(args.collection.clone(), args.force);

        if args.json {
            let mut last = None;
            while let Some(event) = rx.recv().await {
                println!(
                    "{}",
                    serde_json::to_string(&event).unwrap_or_default()
                );
                last = Some(event);
            }
            return finish_embed(last);
        }

        use kdam::{BarExt, tqdm};
        let mut bar: Option<kdam::Bar> = None;
        let mut last = None;
        while let Some(event) = rx.recv().await {
            if event.attached {
                eprintln!("Attached to an embedding job already in flight.");
            }
            if event.status == JobStatus::Running {
                if bar.is_none() && event.total_chunks > 0 {
                    bar = Some(tqdm!(
                        total = event.total_chunks,
                        desc = "embedding"
                    ));
                }
                if let Some(bar) = bar.as_mut() {
                    let _ = bar.update_to(event.done_chunks);
                }
            }
            last = Some(event);
        }
        drop(bar);
        eprintln!();
        finish_embed(last)
    })
}

fn finish_embed(last: Option<docfuse::ProgressEvent>) -> Result<()> {
    match last {
        Some(event) if event.status == JobStatus::Complete => {
            eprintln!(
                "Embedded {} chunks across {} documents.",
                event.done_chunks, event.done_docs
            );
            Ok(())
        }
        Some(event) if event.status == JobStatus::Error => {
            Err(Error::Inference(event.error.unwrap_or_else(|| {
                "embedding job failed".to_string()
            })))
        }
        _ => Ok(()),
    }
}

fn cmd_status(engine: &Engine, args: &StatusArgs) -> Result<()> {
    let status = engine.status()?;

    if args.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&status)
                .unwrap_or_else(|_| "{}".to_string())
        );
    } else {
        println!("Embedding model: {}", status.embedding_model);
        println!("Collections: {}", status.collections);
        println!("Documents: {}", status.active_documents);
        println!("Content rows: {}", status.content_rows);
        println!("Embedded chunks: {}", status.embedded_chunks);
        println!(
            "Embedding job: {}",
            if status.job_running { "running" } else { "idle" }
        );
    }
    Ok(())
}
