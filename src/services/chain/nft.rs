// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Achievement NFT (ERC-721) contract bindings.

use ethers::prelude::abigen;

abigen!(
    FixieAchievements,
    r#"[
        function mintAchievement(address to, string tier, string tokenUri) external returns (uint256)
        function balanceOf(address owner) external view returns (uint256)
        function tokenOfOwnerByIndex(address owner, uint256 index) external view returns (uint256)
        function tokenURI(uint256 tokenId) external view returns (string)
        event AchievementMinted(address indexed to, uint256 indexed tokenId, string tier)
    ]"#
);
