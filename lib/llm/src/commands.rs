// SPDX-FileCopyrightText: Copyright (c) 2024-2025 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

use std::fmt;

/// Chat commands that switch the session into an input-collection mode instead of
/// producing a completion. They must never reach the model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptCommand {
    /// Pick a document or image from the blob store
    File,
    /// Supply an image URL
    Url,
    /// Upload image bytes directly
    Upload,
}

impl PromptCommand {
    /// The whole prompt, ignoring surrounding whitespace, must be the command token.
    pub fn parse(prompt: &str) -> Option<Self> {
        match prompt.trim() {
            "/file" => Some(PromptCommand::File),
            "/url" => Some(PromptCommand::Url),
            "/upload" => Some(PromptCommand::Upload),
            _ => None,
        }
    }

    pub fn token(&self) -> &'static str {
        match self {
            PromptCommand::File => "/file",
            PromptCommand::Url => "/url",
            PromptCommand::Upload => "/upload",
        }
    }
}

impl fmt::Display for PromptCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.token())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("/file", Some(PromptCommand::File))]
    #[case("  /url\n", Some(PromptCommand::Url))]
    #[case("/upload", Some(PromptCommand::Upload))]
    #[case("/url please", None)]
    #[case("what is /file?", None)]
    #[case("/URL", None)]
    #[case("", None)]
    fn test_parse(#[case] prompt: &str, #[case] expected: Option<PromptCommand>) {
        assert_eq!(PromptCommand::parse(prompt), expected);
    }

    #[test]
    fn test_display_round_trips() {
        for command in [PromptCommand::File, PromptCommand::Url, PromptCommand::Upload] {
            assert_eq!(PromptCommand::parse(&command.to_string()), Some(command));
        }
    }
}
