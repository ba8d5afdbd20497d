use std::env;
use std::process;
use std::time::SystemTime;

use domain::adapters::memory_repo::InMemoryRepo;
use domain::code::RandomCodeGenerator;
use domain::service::LinkService;
use domain::{Clock, CoreError, NewLink, ShortCode};

struct StdClock;
impl Clock for StdClock {
    fn now(&self) -> SystemTime {
        SystemTime::now()
    }
}

fn print_usage() {
    eprintln!(
        "{} v{}\n\nUsage:\n  domain create <url> [--title <text>]\n  domain resolve <code>\n\nNotes:\n  - This demo CLI uses an in-memory repository; data is not persisted across runs.",
        env!("CARGO_PKG_NAME"),
        env!("CARGO_PKG_VERSION"),
    );
}

fn run() -> Result<(), String> {
    let mut args = env::args().skip(1); // skip program name

    let Some(cmd) = args.next() else {
        print_usage();
        return Ok(());
    };

    // Construct a demo service with in-memory storage
    let svc = LinkService::new(InMemoryRepo::new(), RandomCodeGenerator, StdClock);

    match cmd.as_str() {
        "create" => {
            let Some(url) = args.next() else {
                return Err("missing <url> for create".into());
            };

            let mut title: Option<String> = None;
            let rest: Vec<String> = args.collect();
            let mut i = 0;
            while i < rest.len() {
                match rest[i].as_str() {
                    "--title" => {
                        if i + 1 >= rest.len() {
                            return Err("--title requires a value".into());
                        }
                        title = Some(rest[i + 1].clone());
                        i += 2;
                    }
                    unk => {
                        return Err(format!("unknown argument: {}", unk));
                    }
                }
            }

            let input = NewLink {
                original_url: url,
                title,
            };
            match svc.create_short_link(input) {
                Ok(link) => {
                    println!("created: {} -> {}", link.short_code, link.original_url);
                    Ok(())
                }
                Err(e) => Err(format!("create failed: {}", e)),
            }
        }
        "resolve" => {
            let Some(code_str) = args.next() else {
                return Err("missing <code> for resolve".into());
            };
            let code = match ShortCode::new(code_str) {
                Ok(c) => c,
                Err(e) => return Err(format!("invalid code: {}", e)),
            };
            match svc.resolve(&code) {
                Ok(Some(resolved)) => {
                    println!("{}", resolved.target);
                    Ok(())
                }
                Ok(None) => Err("not found".into()),
                Err(CoreError::Repository(msg)) => Err(format!("resolve failed: {}", msg)),
                Err(e) => Err(format!("resolve failed: {}", e)),
            }
        }
        _ => {
            print_usage();
            Ok(())
        }
    }
}

fn main() {
    if let Err(msg) = run() {
        eprintln!("error: {}", msg);
        process::exit(1);
    }
}
