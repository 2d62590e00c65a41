//! Plain stderr reporter for CLI progress and error output.

pub trait Reporter {
    fn info(&self, msg: &str);
    fn warn(&self, msg: &str);
    fn error(&self, msg: &str);
}

pub struct CliReporter {
    pub verbose: bool,
}

impl Reporter for CliReporter {
    fn info(&self, msg: &str) {
        eprintln!("[info] {msg}");
    }

    fn warn(&self, msg: &str) {
        eprintln!("[warn] {msg}");
    }

    fn error(&self, msg: &str) {
        eprintln!("[error] {msg}");
    }
}
