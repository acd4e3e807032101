pub mod console {
    use std::io::{self, BufRead, Error, Stdin, Stdout, Write};
    use std::thread;
    use std::time::Duration;

    use tcm_core::device::device::ConsoleDevice;

    const CLEAR_SEQUENCE: &str = "\x1b[2J\x1b[H";

    /// Terminal-backed console: stdin lines in, formatted writes to stdout.
    pub struct StdConsole {
        stdin: Stdin,
        stdout: Stdout,
    }

    impl StdConsole {
        pub fn new() -> StdConsole {
            StdConsole {
                stdin: io::stdin(),
                stdout: io::stdout(),
            }
        }
    }

    impl ConsoleDevice for StdConsole {
        fn read_line(&mut self) -> Result<Option<String>, Error> {
            // character output may be waiting on a prompt without a newline.
            self.stdout.flush()?;

            let mut buf = String::new();
            if self.stdin.lock().read_line(&mut buf)? == 0 {
                return Ok(None);
            }
            let trimmed = buf.trim_end_matches(['\r', '\n']).len();
            buf.truncate(trimmed);
            Ok(Some(buf))
        }

        fn write_output(&mut self, text: &str) -> Result<(), Error> {
            let mut out = self.stdout.lock();
            out.write_all(text.as_bytes())?;
            out.flush()
        }

        fn clear_screen(&mut self) -> Result<(), Error> {
            self.write_output(CLEAR_SEQUENCE)
        }

        fn wait(&mut self, millis: u64) {
            thread::sleep(Duration::from_millis(millis));
        }
    }
}
