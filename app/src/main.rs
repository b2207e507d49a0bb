//! FILENAME: app/src/main.rs
// PURPOSE: Entry point of the `starwh` command-line tool.
// FORMAT: logs go to stderr (and an optional file) as seq|level|category|message

fn main() -> anyhow::Result<()> {
    app_lib::run()
}
