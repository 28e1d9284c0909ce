use methodcmp::compare::{compare_methods, ComparisonMode, MethodVersion, Verdict};
use methodcmp::jvm::{self, ClassFile};

use clap::{App, Arg};

fn main() -> Result<(), jvm::Error> {
    env_logger::init();

    let matches = App::new("Method comparator")
        .version("0.1.0")
        .author("Alec Theriault <alec.theriault@gmail.com>")
        .about("Checks which methods of a redefined class can take over from their old versions")
        .arg(
            Arg::with_name("exact")
                .long("exact")
                .help("Only check for equivalence modulo constant pool"),
        )
        .arg(
            Arg::with_name("method")
                .long("method")
                .value_name("NAME")
                .help("Only compare methods with this name")
                .takes_value(true),
        )
        .arg(
            Arg::with_name("OLD")
                .help("Sets the old version of the class file")
                .required(true)
                .index(1),
        )
        .arg(
            Arg::with_name("NEW")
                .help("Sets the new version of the class file")
                .required(true)
                .index(2),
        )
        .get_matches();

    let mode = if matches.is_present("exact") {
        ComparisonMode::Exact
    } else {
        ComparisonMode::Switchable
    };
    let only_method = matches.value_of("method");

    // Both are required arguments
    let old_path = matches.value_of("OLD").unwrap_or_default();
    let new_path = matches.value_of("NEW").unwrap_or_default();

    log::info!("Reading '{}'", old_path);
    let old_class = ClassFile::read_from_path(old_path)?;
    log::info!("Reading '{}'", new_path);
    let new_class = ClassFile::read_from_path(new_path)?;
    log::info!(
        "Comparing methods of '{}'",
        old_class.class_name().unwrap_or("<unnamed>")
    );

    for old_method in &old_class.methods {
        let name = old_class.method_name(old_method).unwrap_or("<unnamed>");
        let descriptor = old_class.method_descriptor(old_method).unwrap_or("");
        if only_method.map_or(false, |only| only != name) {
            continue;
        }

        let new_method = match new_class.find_method(name, descriptor) {
            Some(new_method) => new_method,
            None => {
                println!("{}{}: removed", name, descriptor);
                continue;
            }
        };
        let (old_body, new_body) = match (old_method.body(), new_method.body()) {
            (Some(old_body), Some(new_body)) => (old_body, new_body),
            _ => {
                println!("{}{}: skipped (no code)", name, descriptor);
                continue;
            }
        };

        let verdict = compare_methods(
            MethodVersion::new(old_body, &old_class.constants),
            MethodVersion::new(new_body, &new_class.constants),
            mode,
        );
        match verdict {
            Verdict::Emcp => println!("{}{}: EMCP", name, descriptor),
            Verdict::Switchable(positions) => {
                println!("{}{}: switchable {}", name, descriptor, positions)
            }
            Verdict::Differs(precondition) if precondition.is_compatible() => {
                println!("{}{}: differs (code differs)", name, descriptor)
            }
            Verdict::Differs(precondition) => {
                println!("{}{}: differs ({})", name, descriptor, precondition)
            }
        }
    }

    Ok(())
}
