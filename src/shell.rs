use std::collections::HashMap;
use std::io::{self, BufRead, Write};
use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};
use crossterm::terminal;
use textwrap::{wrap, Options as WrapOptions};
use unicode_width::UnicodeWidthStr;

use crate::config::UiConfig;
use crate::data::{FeedService, ThreadService};
use crate::hackernews::Section;
use crate::items::{Story, Thread};
use crate::session;

/// Minimum usable text column, however narrow the terminal claims to be.
const MIN_WRAP_WIDTH: usize = 16;
const FALLBACK_TERM_WIDTH: usize = 80;

const COMMANDS: &[(&str, &str)] = &[
    ("cd", "Change location: cd /newest, cd 3, cd .."),
    ("ls", "List stories here, or the comments of the current story"),
    ("open", "Open a story in the browser: open 3, or open inside a thread"),
    (
        "post",
        "Reply with text inside a thread; submit a story from a section",
    ),
    ("su", "Log in: su <user> (prompts for the password)"),
    ("help", "Show help for all commands or one: help cd"),
    ("exit", "Leave the shell"),
    ("quit", "Leave the shell"),
];

/// Where the shell currently is: a section listing or one story's thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Location {
    Section(Section),
    Thread { section: Section, index: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Continue,
    Exit,
}

pub struct Options {
    pub feeds: Arc<dyn FeedService>,
    pub threads: Arc<dyn ThreadService>,
    pub session: session::Manager,
    pub ui: UiConfig,
}

/// The command loop. Commands mutate the location and the per-section
/// listing cache; indices shown by `ls` are the ones `cd` and `open`
/// resolve against.
pub struct Shell {
    feeds: Arc<dyn FeedService>,
    threads: Arc<dyn ThreadService>,
    session: session::Manager,
    ui: UiConfig,
    cwd: Location,
    listings: HashMap<Section, Vec<Story>>,
}

impl Shell {
    pub fn new(options: Options) -> Self {
        Self {
            feeds: options.feeds,
            threads: options.threads,
            session: options.session,
            ui: options.ui,
            cwd: Location::Section(Section::Top),
            listings: HashMap::new(),
        }
    }

    pub fn cwd(&self) -> Location {
        self.cwd
    }

    pub fn prompt(&self) -> String {
        format!("{} {}", self.path(), self.session.prompt())
    }

    pub fn run(&mut self) -> Result<()> {
        let stdin = io::stdin();
        let mut stdout = io::stdout();
        loop {
            write!(stdout, "{}", self.prompt())?;
            stdout.flush()?;

            let mut line = String::new();
            if stdin.lock().read_line(&mut line)? == 0 {
                writeln!(stdout)?;
                break;
            }
            match self.execute(&line, &mut stdout) {
                Ok(Outcome::Exit) => break,
                Ok(Outcome::Continue) => {}
                Err(err) => writeln!(stdout, "*** {err:#}")?,
            }
        }
        Ok(())
    }

    /// Runs one input line. A blank line is a no-op; an unknown word is
    /// retried as an unambiguous command prefix.
    pub fn execute(&mut self, line: &str, out: &mut dyn Write) -> Result<Outcome> {
        let line = line.trim();
        if line.is_empty() {
            return Ok(Outcome::Continue);
        }

        let (command, arg) = match line.split_once(char::is_whitespace) {
            Some((command, arg)) => (command, arg.trim()),
            None => (line, ""),
        };

        match command {
            "cd" => self.cmd_cd(arg)?,
            "ls" => self.cmd_ls(arg, out)?,
            "open" => self.cmd_open(arg, out)?,
            "post" => self.cmd_post(arg, out)?,
            "su" => self.cmd_su(arg, out)?,
            "help" => self.cmd_help(arg, out)?,
            "exit" | "quit" => return Ok(Outcome::Exit),
            other => return self.execute_prefix(other, arg, out),
        }
        Ok(Outcome::Continue)
    }

    /// A word that is a prefix of exactly one command runs that command.
    fn execute_prefix(&mut self, word: &str, arg: &str, out: &mut dyn Write) -> Result<Outcome> {
        let matches: Vec<&str> = COMMANDS
            .iter()
            .map(|(name, _)| *name)
            .filter(|name| name.starts_with(word))
            .collect();
        match matches.as_slice() {
            [name] => self.execute(&format!("{name} {arg}"), out),
            [] => bail!("unknown command: {word}"),
            _ => bail!("ambiguous command: {word} ({})", matches.join(", ")),
        }
    }

    fn cmd_cd(&mut self, arg: &str) -> Result<()> {
        if arg.is_empty() {
            self.cwd = Location::Section(Section::Top);
            return Ok(());
        }
        let target = self.locate(arg)?;
        if let Location::Thread { section, index } = target {
            // Fail now, not on the next ls, when the story is not there.
            self.story_at(section, index)?;
        }
        self.cwd = target;
        Ok(())
    }

    fn cmd_ls(&mut self, arg: &str, out: &mut dyn Write) -> Result<()> {
        match self.cwd {
            Location::Section(section) => {
                let count = if arg.is_empty() {
                    self.ui.page_limit
                } else {
                    arg.parse()
                        .map_err(|_| anyhow!("invalid story count: {arg}"))?
                };
                let stories = self.feeds.stories(section, Some(count))?;
                print_stories(&stories, out)?;
                self.listings.insert(section, stories);
            }
            Location::Thread { section, index } => {
                let story = self.story_at(section, index)?;
                if story.comments_count == 0 {
                    writeln!(out, "No comments for this story")?;
                    return Ok(());
                }
                let thread = self.threads.thread(story.id)?;
                if thread.is_empty() {
                    writeln!(out, "No comments for this story")?;
                    return Ok(());
                }
                self.print_thread(&thread, out)?;
            }
        }
        Ok(())
    }

    fn cmd_open(&mut self, arg: &str, out: &mut dyn Write) -> Result<()> {
        let (section, index) = match (arg.is_empty(), self.cwd) {
            (true, Location::Thread { section, index }) => (section, index),
            (true, Location::Section(_)) => bail!("open: no story selected"),
            (false, _) => match self.locate(arg)? {
                Location::Thread { section, index } => (section, index),
                Location::Section(_) => bail!("open: not a story: {arg}"),
            },
        };
        let story = self.story_at(section, index)?;
        webbrowser::open(&story.url).with_context(|| format!("open {}", story.url))?;
        writeln!(out, "Opening {}", story.url)?;
        Ok(())
    }

    fn cmd_post(&mut self, arg: &str, out: &mut dyn Write) -> Result<()> {
        match self.cwd {
            Location::Thread { section, index } => {
                if arg.is_empty() {
                    bail!("post: nothing to say (usage: post <text>)");
                }
                let story = self.story_at(section, index)?;
                self.session.reply(story.id, arg)?;
                writeln!(out, "Posted reply to story {}", story.id)?;
            }
            Location::Section(_) => {
                if arg.is_empty() {
                    bail!("post: nothing to submit (usage: post <title> [url])");
                }
                let (title, url) = split_submission(arg);
                if title.is_empty() {
                    bail!("post: a submission needs a title");
                }
                self.session.submit(title, url, None)?;
                writeln!(out, "Submitted: {title}")?;
            }
        }
        Ok(())
    }

    fn cmd_su(&mut self, arg: &str, out: &mut dyn Write) -> Result<()> {
        let user = arg.trim();
        if user.is_empty() {
            bail!("no username provided");
        }
        let password = read_password("Password: ")?;
        let session = self.session.login(user, &password)?;
        writeln!(
            out,
            "Logged in as {} ({} karma)",
            session.user.name, session.user.karma
        )?;
        Ok(())
    }

    fn cmd_help(&mut self, arg: &str, out: &mut dyn Write) -> Result<()> {
        if !arg.is_empty() {
            let entry = COMMANDS
                .iter()
                .find(|(name, _)| *name == arg)
                .ok_or_else(|| anyhow!("unknown command: {arg}"))?;
            writeln!(out, "{}:\n\t{}", entry.0, entry.1)?;
            return Ok(());
        }
        for (name, blurb) in COMMANDS {
            writeln!(out, "{name:<6} {blurb}")?;
        }
        let sections: Vec<&str> = Section::all().iter().map(Section::display_name).collect();
        writeln!(out, "\nSections: {}", sections.join(", "))?;
        Ok(())
    }

    /// Resolves a path argument relative to the current location.
    fn locate(&self, arg: &str) -> Result<Location> {
        let parts = resolve(&self.path_parts(), arg);
        location_of(&parts)
    }

    fn path_parts(&self) -> Vec<String> {
        match self.cwd {
            Location::Section(section) => section_parts(section),
            Location::Thread { section, index } => {
                let mut parts = section_parts(section);
                parts.push(index.to_string());
                parts
            }
        }
    }

    fn path(&self) -> String {
        let parts = self.path_parts();
        if parts.is_empty() {
            "/".to_string()
        } else {
            format!("/{}", parts.join("/"))
        }
    }

    /// The story at an index of a section's last listing, fetching the
    /// listing if this section has not been listed yet.
    fn story_at(&mut self, section: Section, index: usize) -> Result<Story> {
        if !self.listings.contains_key(&section) {
            let stories = self.feeds.stories(section, None)?;
            self.listings.insert(section, stories);
        }
        let stories = &self.listings[&section];
        stories
            .get(index)
            .cloned()
            .ok_or_else(|| anyhow!("unknown story: {}/{index}", section.display_name()))
    }

    /// Renders the comment forest the way the site indents it: a `+--`
    /// header per comment, text wrapped under it, `|` connecting
    /// consecutive comments.
    fn print_thread(&self, thread: &Thread, out: &mut dyn Write) -> Result<()> {
        let usable = terminal_width() * usize::from(self.ui.width_percent) / 100;
        let total = thread.len();

        for (seq, (_, comment)) in thread.walk().enumerate() {
            let last = seq + 1 == total;
            let level = comment.depth + 1;

            let connector = if last { " " } else { "|" };
            let line_indent = format!("{}{}", connector, " ".repeat(3 * level - 1));
            let header_indent = format!("+{} ", "-".repeat(3 * level - 2));
            let wrap_width = usable
                .saturating_sub(UnicodeWidthStr::width(line_indent.as_str()))
                .max(MIN_WRAP_WIDTH);

            writeln!(out, "{header_indent}{} ({}):", comment.author, comment.age)?;
            for paragraph in comment.text.split('\n') {
                if paragraph.trim().is_empty() {
                    writeln!(out, "{}", line_indent.trim_end())?;
                    continue;
                }
                let options = WrapOptions::new(wrap_width).break_words(false);
                for line in wrap(paragraph, options) {
                    writeln!(out, "{line_indent}{line}")?;
                }
            }
            if !last {
                writeln!(out, "|")?;
            }
        }
        Ok(())
    }
}

fn print_stories(stories: &[Story], out: &mut dyn Write) -> Result<()> {
    let width = stories.len().saturating_sub(1).to_string().len();
    for (ix, story) in stories.iter().enumerate() {
        let number = format!("{ix:0width$}: ");
        writeln!(out, "{number}{} ({})", story.title, story.url)?;
        writeln!(out, "{}{}", " ".repeat(number.len()), story.subtext())?;
    }
    Ok(())
}

/// Normalizes a path argument against the current segments: absolute paths
/// restart at the root, `.` is dropped, `..` pops.
fn resolve(cwd: &[String], arg: &str) -> Vec<String> {
    let mut parts: Vec<String> = if arg.starts_with('/') {
        Vec::new()
    } else {
        cwd.to_vec()
    };
    for segment in arg.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            other => parts.push(other.to_string()),
        }
    }
    parts
}

/// Maps normalized segments onto the site: `/` and `/newest`-style section
/// directories, with a numeric final segment selecting a story thread.
fn location_of(parts: &[String]) -> Result<Location> {
    match parts {
        [] => Ok(Location::Section(Section::Top)),
        [single] => {
            if let Some(section) = section_named(single) {
                return Ok(Location::Section(section));
            }
            let index = parse_index(single)?;
            Ok(Location::Thread {
                section: Section::Top,
                index,
            })
        }
        [dir, leaf] => {
            let section =
                section_named(dir).ok_or_else(|| anyhow!("no such section: /{dir}"))?;
            let index = parse_index(leaf)?;
            Ok(Location::Thread { section, index })
        }
        _ => bail!("no such path: /{}", parts.join("/")),
    }
}

fn parse_index(segment: &str) -> Result<usize> {
    segment
        .parse()
        .map_err(|_| anyhow!("not a story index: {segment}"))
}

fn section_named(name: &str) -> Option<Section> {
    match name {
        "news" | "top" => Some(Section::Top),
        "newest" => Some(Section::Newest),
        "ask" => Some(Section::Ask),
        "jobs" => Some(Section::Jobs),
        _ => None,
    }
}

fn section_parts(section: Section) -> Vec<String> {
    match section {
        Section::Top => Vec::new(),
        other => vec![other.as_path().to_string()],
    }
}

/// `post` in a section: a trailing token that parses as an http(s) URL is
/// the submission link, everything before it the title.
fn split_submission(arg: &str) -> (&str, Option<&str>) {
    match arg.rsplit_once(char::is_whitespace) {
        Some((title, tail)) if tail.starts_with("http://") || tail.starts_with("https://") => {
            (title.trim(), Some(tail))
        }
        _ => (arg, None),
    }
}

fn terminal_width() -> usize {
    terminal::size()
        .map(|(cols, _)| usize::from(cols))
        .unwrap_or(FALLBACK_TERM_WIDTH)
}

/// Reads a line with echo off, raw-mode key by key. Used only for the
/// `su` password prompt.
fn read_password(prompt: &str) -> Result<String> {
    use crossterm::event::{read, Event, KeyCode, KeyEventKind, KeyModifiers};

    let mut stdout = io::stdout();
    write!(stdout, "{prompt}")?;
    stdout.flush()?;

    terminal::enable_raw_mode().context("enable raw mode for password entry")?;
    let mut password = String::new();
    let outcome = loop {
        match read() {
            Ok(Event::Key(key)) if key.kind == KeyEventKind::Press => match key.code {
                KeyCode::Enter => break Ok(()),
                KeyCode::Backspace => {
                    password.pop();
                }
                KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                    password.clear();
                    break Err(anyhow!("password entry cancelled"));
                }
                KeyCode::Char(c) => password.push(c),
                _ => {}
            },
            Ok(_) => {}
            Err(err) => break Err(err.into()),
        }
    };
    terminal::disable_raw_mode().ok();
    writeln!(stdout)?;
    outcome.map(|()| password)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{MockAccountService, MockFeedService, MockThreadService};
    use crate::items::Comment;

    fn sample_stories() -> Vec<Story> {
        vec![
            Story {
                id: 11,
                title: "First story".into(),
                url: "https://example.com/one".into(),
                author: "alice".into(),
                points: 10,
                age: "1 hour ago".into(),
                comments_count: 2,
                job: false,
            },
            Story {
                id: 12,
                title: "Quiet story".into(),
                url: "https://example.com/two".into(),
                author: "bob".into(),
                points: 3,
                age: "2 hours ago".into(),
                comments_count: 0,
                job: false,
            },
        ]
    }

    fn sample_thread() -> Thread {
        let comments = vec![
            Comment::new(21, 11, "carol", "top comment", "1 hour ago", 0),
            Comment::new(22, 11, "dave", "a reply", "30 minutes ago", 1),
            Comment::new(23, 11, "erin", "another top", "10 minutes ago", 0),
        ];
        Thread::from_flat(11, comments)
    }

    fn shell() -> Shell {
        shell_with_session(session::Manager::new(Arc::new(MockAccountService::default())))
    }

    fn shell_with_session(session: session::Manager) -> Shell {
        Shell::new(Options {
            feeds: Arc::new(MockFeedService {
                stories: sample_stories(),
            }),
            threads: Arc::new(MockThreadService {
                thread: sample_thread(),
            }),
            session,
            ui: UiConfig::default(),
        })
    }

    fn run(shell: &mut Shell, line: &str) -> Result<String> {
        let mut out = Vec::new();
        shell.execute(line, &mut out)?;
        Ok(String::from_utf8(out).expect("utf8 output"))
    }

    #[test]
    fn resolve_normalizes_segments() {
        let cwd = vec!["newest".to_string(), "3".to_string()];
        assert_eq!(resolve(&cwd, "/ask"), vec!["ask"]);
        assert_eq!(resolve(&cwd, ".."), vec!["newest"]);
        assert_eq!(resolve(&cwd, "../.."), Vec::<String>::new());
        assert_eq!(resolve(&cwd, "../5"), vec!["newest", "5"]);
        assert_eq!(resolve(&[], "./newest//4"), vec!["newest", "4"]);
        // Popping past the root stays at the root.
        assert_eq!(resolve(&[], "../../ask"), vec!["ask"]);
    }

    #[test]
    fn locations_map_onto_sections_and_threads() {
        assert_eq!(
            location_of(&[]).unwrap(),
            Location::Section(Section::Top)
        );
        assert_eq!(
            location_of(&["jobs".into()]).unwrap(),
            Location::Section(Section::Jobs)
        );
        assert_eq!(
            location_of(&["7".into()]).unwrap(),
            Location::Thread {
                section: Section::Top,
                index: 7
            }
        );
        assert_eq!(
            location_of(&["newest".into(), "0".into()]).unwrap(),
            Location::Thread {
                section: Section::Newest,
                index: 0
            }
        );
        assert!(location_of(&["nope".into()]).is_err());
        assert!(location_of(&["newest".into(), "x".into()]).is_err());
        assert!(location_of(&["newest".into(), "1".into(), "2".into()]).is_err());
    }

    #[test]
    fn ls_prints_numbered_stories_and_caches() {
        let mut shell = shell();
        let output = run(&mut shell, "ls").unwrap();
        assert!(output.contains("0: First story (https://example.com/one)"));
        assert!(output.contains("10 points by alice 1 hour ago | 2 comments"));
        assert!(output.contains("1: Quiet story (https://example.com/two)"));
    }

    #[test]
    fn ls_rejects_a_bad_count() {
        let mut shell = shell();
        let err = run(&mut shell, "ls nope").unwrap_err();
        assert!(err.to_string().contains("invalid story count"));
    }

    #[test]
    fn cd_into_story_and_back() {
        let mut shell = shell();
        run(&mut shell, "cd /newest").unwrap();
        assert_eq!(shell.cwd(), Location::Section(Section::Newest));
        assert_eq!(shell.prompt(), "/newest hn$ ");

        run(&mut shell, "cd 0").unwrap();
        assert_eq!(
            shell.cwd(),
            Location::Thread {
                section: Section::Newest,
                index: 0
            }
        );
        assert_eq!(shell.prompt(), "/newest/0 hn$ ");

        run(&mut shell, "cd ..").unwrap();
        assert_eq!(shell.cwd(), Location::Section(Section::Newest));

        run(&mut shell, "cd").unwrap();
        assert_eq!(shell.cwd(), Location::Section(Section::Top));
    }

    #[test]
    fn cd_rejects_missing_story() {
        let mut shell = shell();
        let err = run(&mut shell, "cd /newest/9").unwrap_err();
        assert!(err.to_string().contains("unknown story"));
        assert_eq!(shell.cwd(), Location::Section(Section::Top));
    }

    #[test]
    fn ls_in_thread_renders_the_comment_tree() {
        let mut shell = shell();
        run(&mut shell, "cd 0").unwrap();
        let output = run(&mut shell, "ls").unwrap();

        assert!(output.contains("+- carol (1 hour ago):"));
        assert!(output.contains("top comment"));
        // The reply sits one level deeper than its parent.
        assert!(output.contains("+---- dave (30 minutes ago):"));
        assert!(output.contains("+- erin (10 minutes ago):"));
        let carol = output.find("carol").unwrap();
        let dave = output.find("dave").unwrap();
        let erin = output.find("erin").unwrap();
        assert!(carol < dave && dave < erin);
    }

    #[test]
    fn ls_reports_a_commentless_story() {
        let mut shell = shell();
        run(&mut shell, "cd 1").unwrap();
        let output = run(&mut shell, "ls").unwrap();
        assert_eq!(output.trim(), "No comments for this story");
    }

    #[test]
    fn open_needs_a_story() {
        let mut shell = shell();
        let err = run(&mut shell, "open").unwrap_err();
        assert!(err.to_string().contains("no story selected"));

        let err = run(&mut shell, "open /ask").unwrap_err();
        assert!(err.to_string().contains("not a story"));
    }

    #[test]
    fn post_requires_login() {
        let mut shell = shell();
        run(&mut shell, "cd 0").unwrap();
        let err = run(&mut shell, "post hello there").unwrap_err();
        assert!(err.to_string().contains("not logged in"));
    }

    #[test]
    fn post_replies_in_a_thread_when_logged_in() {
        let account = Arc::new(MockAccountService {
            password: "secret".into(),
            karma: 7,
            ..Default::default()
        });
        let mut manager = session::Manager::new(account.clone());
        manager.login("alice", "secret").unwrap();

        let mut shell = shell_with_session(manager);
        run(&mut shell, "cd 0").unwrap();
        let output = run(&mut shell, "post nice article").unwrap();
        assert!(output.contains("Posted reply to story 11"));
        assert_eq!(
            account.replies.lock().unwrap().as_slice(),
            &[(11, "nice article".to_string())]
        );
    }

    #[test]
    fn post_submits_from_a_section() {
        let account = Arc::new(MockAccountService {
            password: "secret".into(),
            karma: 7,
            ..Default::default()
        });
        let mut manager = session::Manager::new(account.clone());
        manager.login("alice", "secret").unwrap();

        let mut shell = shell_with_session(manager);
        let output = run(&mut shell, "post My project https://example.com/p").unwrap();
        assert!(output.contains("Submitted: My project"));
    }

    #[test]
    fn submission_splits_trailing_url() {
        assert_eq!(
            split_submission("My project https://example.com/p"),
            ("My project", Some("https://example.com/p"))
        );
        assert_eq!(split_submission("Ask HN: why?"), ("Ask HN: why?", None));
    }

    #[test]
    fn su_needs_a_username() {
        let mut shell = shell();
        let err = run(&mut shell, "su").unwrap_err();
        assert!(err.to_string().contains("no username provided"));
    }

    #[test]
    fn unambiguous_prefix_runs_the_command() {
        let mut shell = shell();
        let output = run(&mut shell, "l").unwrap();
        assert!(output.contains("First story"));

        let err = run(&mut shell, "frobnicate").unwrap_err();
        assert!(err.to_string().contains("unknown command"));
    }

    #[test]
    fn blank_line_is_a_no_op() {
        let mut shell = shell();
        let output = run(&mut shell, "   ").unwrap();
        assert!(output.is_empty());
    }

    #[test]
    fn exit_stops_the_loop() {
        let mut shell = shell();
        let mut out = Vec::new();
        assert_eq!(shell.execute("exit", &mut out).unwrap(), Outcome::Exit);
        assert_eq!(shell.execute("q", &mut out).unwrap(), Outcome::Exit);
    }

    #[test]
    fn help_lists_commands() {
        let mut shell = shell();
        let output = run(&mut shell, "help").unwrap();
        for (name, _) in COMMANDS {
            assert!(output.contains(name), "missing {name} in help");
        }
        let output = run(&mut shell, "help cd").unwrap();
        assert!(output.starts_with("cd:"));
    }
}
