// SPDX-FileCopyrightText: Copyright (c) 2024-2025 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Output {
    /// Echos the prompt back as the response
    Echo,
}

impl TryFrom<&str> for Output {
    type Error = anyhow::Error;

    fn try_from(s: &str) -> anyhow::Result<Self> {
        match s {
            "echo" | "echo_full" => Ok(Output::Echo),
            e => Err(anyhow::anyhow!(
                "Invalid out= option '{e}'. Available engines: {}",
                Output::available_engines().join(", ")
            )),
        }
    }
}

impl fmt::Display for Output {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let s = match self {
            Output::Echo => "echo",
        };
        write!(f, "{s}")
    }
}

impl Output {
    pub fn available_engines() -> Vec<String> {
        vec![Output::Echo.to_string()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_parse() {
        assert_eq!(Output::try_from("echo").unwrap(), Output::Echo);
        assert_eq!(Output::try_from("echo_full").unwrap(), Output::Echo);
        let err = Output::try_from("vllm").unwrap_err();
        assert!(err.to_string().contains("echo"));
    }
}
