use anyhow::Result;
use console::style;
use futures::StreamExt;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use std::path::PathBuf;

use heron::agent::Agent;
use heron::models::message::{Message, MessageContent, Role};

use crate::session_file::persist_messages;

pub struct Session {
    agent: Agent,
    session_file: PathBuf,
    max_turns: usize,
    messages: Vec<Message>,
}

impl Session {
    pub fn new(
        agent: Agent,
        session_file: PathBuf,
        max_turns: usize,
        messages: Vec<Message>,
    ) -> Self {
        Session {
            agent,
            session_file,
            max_turns,
            messages,
        }
    }

    pub async fn start(&mut self) -> Result<()> {
        println!(
            "Starting session. Recording to {}",
            style(self.session_file.display()).dim()
        );
        println!("{}", style("Type \"exit\" to end the session.").dim());

        let mut editor = DefaultEditor::new()?;
        loop {
            let line = match editor.readline("> ") {
                Ok(line) => line,
                Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => break,
                Err(e) => return Err(e.into()),
            };

            let input = line.trim();
            if input.is_empty() {
                continue;
            }
            if input.eq_ignore_ascii_case("exit") {
                break;
            }
            editor.add_history_entry(input)?;

            self.messages.push(Message::user().with_text(input));
            persist_messages(&self.session_file, &self.messages)?;

            if let Err(e) = self.process_messages().await {
                eprintln!("{} {}", style("Error:").red(), e);
            }
        }

        println!("{}", style("Session ended.").dim());
        Ok(())
    }

    pub async fn headless(&mut self, initial_message: &str) -> Result<()> {
        self.messages
            .push(Message::user().with_text(initial_message));
        persist_messages(&self.session_file, &self.messages)?;

        self.process_messages().await
    }

    /// Drive one reply run, streaming messages into the conversation.
    ///
    /// The agent loop itself is unbounded; this caller imposes the safety
    /// bound by counting assistant turns, and Ctrl-C rolls the conversation
    /// back to before the interrupted user message.
    async fn process_messages(&mut self) -> Result<()> {
        let spin = cliclack::spinner();
        spin.start("awaiting reply");
        let mut spinning = true;

        let mut stream = self.agent.reply(&self.messages).await?;

        let mut assistant_turns = 0usize;
        loop {
            tokio::select! {
                response = stream.next() => {
                    match response {
                        Some(Ok(message)) => {
                            if spinning {
                                spin.stop("");
                                spinning = false;
                            }
                            if message.role == Role::Assistant {
                                assistant_turns += 1;
                            }
                            self.messages.push(message.clone());
                            persist_messages(&self.session_file, &self.messages)
                                .unwrap_or_else(|e| eprintln!("Failed to persist messages: {}", e));
                            render(&message);

                            if assistant_turns >= self.max_turns {
                                drop(stream);
                                println!(
                                    "{}",
                                    style(format!(
                                        "Stopped after {} assistant turns (--max-turns).",
                                        assistant_turns
                                    ))
                                    .yellow()
                                );
                                break;
                            }
                        }
                        Some(Err(e)) => {
                            if spinning {
                                spin.stop("");
                            }
                            return Err(e);
                        }
                        None => {
                            if spinning {
                                spin.stop("");
                            }
                            break;
                        }
                    }
                }
                _ = tokio::signal::ctrl_c() => {
                    if spinning {
                        spin.stop("");
                    }
                    drop(stream);
                    // Reset the interaction to before the interrupted user
                    // request. Tool results also ride on user-role messages,
                    // so pop until a plain text user message is removed.
                    while let Some(message) = self.messages.pop() {
                        let plain_user = message.role == Role::User
                            && message
                                .content
                                .iter()
                                .all(|c| matches!(c, MessageContent::Text(_)));
                        if plain_user {
                            break;
                        }
                    }
                    println!(
                        "{}",
                        style("Interrupt: resetting conversation to before the last message.")
                            .yellow()
                    );
                    break;
                }
            }
        }

        Ok(())
    }
}

fn render(message: &Message) {
    for content in &message.content {
        match content {
            MessageContent::Text(text) => {
                if !text.is_empty() {
                    println!("{}", text);
                }
            }
            MessageContent::ToolRequest(request) => match &request.tool_call {
                Ok(call) => println!(
                    "{} {}({})",
                    style("tool:").cyan(),
                    style(&call.name).cyan(),
                    style(call.arguments.to_string()).dim()
                ),
                Err(e) => println!("{} {}", style("tool error:").red(), e),
            },
            MessageContent::ToolResponse(response) => match &response.tool_result {
                Ok(contents) => {
                    for item in contents {
                        println!("{}", style(item.render()).dim());
                    }
                }
                Err(e) => println!("{} {}", style("tool error:").red(), e),
            },
        }
    }
}
