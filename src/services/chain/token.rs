// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! FIXIE ERC-20 reward contract bindings.

use ethers::prelude::abigen;

abigen!(
    FixieToken,
    r#"[
        function balanceOf(address account) external view returns (uint256)
        function rewardActivity(address recipient, bytes32 activityId, uint256 amount) external returns (bool)
        event ActivityRewarded(address indexed recipient, bytes32 indexed activityId, uint256 amount)
    ]"#
);
