pub mod device {
    use std::collections::VecDeque;
    use std::io::Error;

    /// Console surface the engine drives. The terminal implementation lives in
    /// the runtime binary; tests use [`HeadlessConsole`].
    pub trait ConsoleDevice {
        /// One line of input without its line terminator, `None` at end of input.
        fn read_line(&mut self) -> Result<Option<String>, Error>;
        fn write_output(&mut self, text: &str) -> Result<(), Error>;
        fn clear_screen(&mut self) -> Result<(), Error>;
        fn wait(&mut self, millis: u64);
    }

    /// In-memory console: scripted input lines, captured output.
    #[derive(Clone, Debug, Default)]
    pub struct HeadlessConsole {
        pub input: VecDeque<String>,
        pub output: String,
        pub clears: usize,
        pub waited_ms: u64,
    }

    impl HeadlessConsole {
        pub fn new() -> HeadlessConsole {
            HeadlessConsole::default()
        }

        pub fn with_input<I, S>(lines: I) -> HeadlessConsole
        where
            I: IntoIterator<Item = S>,
            S: Into<String>,
        {
            HeadlessConsole {
                input: lines.into_iter().map(Into::into).collect(),
                ..HeadlessConsole::default()
            }
        }
    }

    impl ConsoleDevice for HeadlessConsole {
        fn read_line(&mut self) -> Result<Option<String>, Error> {
            Ok(self.input.pop_front())
        }

        fn write_output(&mut self, text: &str) -> Result<(), Error> {
            self.output.push_str(text);
            Ok(())
        }

        fn clear_screen(&mut self) -> Result<(), Error> {
            self.clears += 1;
            self.output.clear();
            Ok(())
        }

        // time is only accounted, never slept.
        fn wait(&mut self, millis: u64) {
            self.waited_ms += millis;
        }
    }
}
